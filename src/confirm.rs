//! Explicit user consent for consequential actions
//!
//! Manual attendance, finalising a session and registering a fresh credential
//! all ask a [`Confirmer`] first. Only an accepted request produces a
//! [`Confirmed`] token, and the state transitions that need consent take that
//! token by value, so they cannot be reached without it.

use std::fmt;

use async_trait::async_trait;

use crate::models::Student;

/// What the user is being asked to approve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationRequest {
    /// Record attendance for a student without a fingerprint
    ManualAttendance { student: Student },
    /// Close the roll call with `marked` of `total` students present
    Finalize { marked: usize, total: usize },
    /// Enroll a new fingerprint credential for a student
    RegisterCredential { student: Student },
}

impl fmt::Display for ConfirmationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManualAttendance { student } => {
                write!(f, "Record manual attendance for {}?", student.name)
            }
            Self::Finalize { marked, total } => write!(
                f,
                "Finish taking attendance?\n\nStudents present: {marked} of {total}"
            ),
            Self::RegisterCredential { student } => {
                write!(f, "Register a fingerprint for {}?", student.name)
            }
        }
    }
}

/// Proof that the user accepted a [`ConfirmationRequest`]
#[derive(Debug)]
pub struct Confirmed {
    _private: (),
}

impl Confirmed {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

/// Asks the user to approve an action
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// `true` when the user accepts
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Ask `confirmer` and mint a token when the answer is yes
pub async fn request(confirmer: &dyn Confirmer, request: &ConfirmationRequest) -> Option<Confirmed> {
    if confirmer.confirm(request).await {
        log::debug!("Confirmed: {}", request.to_string().lines().next().unwrap_or_default());
        Some(Confirmed::new())
    } else {
        log::info!("Declined: {}", request.to_string().lines().next().unwrap_or_default());
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock::ScriptedConfirmer;

    #[test]
    fn test_prompts_name_the_subject() {
        let student = Student::new("s-1", "Ana Lopez", false);
        assert_eq!(
            ConfirmationRequest::ManualAttendance {
                student: student.clone()
            }
            .to_string(),
            "Record manual attendance for Ana Lopez?"
        );
        assert!(ConfirmationRequest::Finalize { marked: 3, total: 5 }
            .to_string()
            .ends_with("3 of 5"));
        assert!(ConfirmationRequest::RegisterCredential { student }
            .to_string()
            .contains("Ana Lopez"));
    }

    #[tokio::test]
    async fn test_token_only_on_acceptance() {
        let confirmer = ScriptedConfirmer::answering(false);
        let request_finalize = ConfirmationRequest::Finalize { marked: 0, total: 1 };
        assert!(request(&confirmer, &request_finalize).await.is_none());

        let confirmer = ScriptedConfirmer::answering(true);
        assert!(request(&confirmer, &request_finalize).await.is_some());
        assert_eq!(confirmer.requests(), vec![request_finalize]);
    }
}

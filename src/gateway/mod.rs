//! Backend gateway contract
//!
//! The controllers never talk HTTP directly. They go through a
//! [`BackendGateway`], which issues challenges, accepts credentials, resolves
//! identities and records attendance. [`HttpGateway`] is the production
//! implementation; tests use the scripted gateway in `testing::mock`.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AttendanceMethod, AttendanceRecord, AttendanceStamp, ResolvedStudent};

pub use http::HttpGateway;

/// Failures talking to the backend
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The backend answered with an error body
    #[error("{message}")]
    Rejected {
        status: u16,
        message: String,
        suggestions: Vec<String>,
    },

    /// The backend answered with an unexpected status and no usable body
    #[error("unexpected response status {0}")]
    Status(u16),

    /// The request never completed
    #[error("request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transport("request timed out".to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Error body the backend sends alongside non-success statuses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// Issued before a registration ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationChallenge {
    pub challenge: String,
    pub user_name: String,
}

/// Credential material submitted after a registration ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSubmission {
    pub credential_id: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedCredential {
    pub id: String,
}

/// Issued before a verification ceremony, scoped to a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationChallenge {
    pub challenge: String,
    #[serde(default)]
    pub allowed_credentials: Vec<AllowedCredential>,
}

impl VerificationChallenge {
    /// Credential ids enrolled in the group, in the order the backend sent them
    #[must_use]
    pub fn credential_ids(&self) -> Vec<String> {
        self.allowed_credentials.iter().map(|c| c.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationChallengeRequest {
    pub group_id: String,
}

/// Credential id produced by a verification ceremony, for identity resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub credential_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

/// What the backend resolved from a credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<ResolvedStudent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl VerificationOutcome {
    /// A resolved identity, when `found` is set and a student came back
    #[must_use]
    pub fn resolved(&self) -> Option<&ResolvedStudent> {
        if self.found {
            self.student.as_ref()
        } else {
            None
        }
    }
}

/// Body of a manual attendance record; `student_id` repeats the path id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAttendanceRequest {
    pub student_id: String,
    pub method: AttendanceMethod,
}

/// The backend services used by the capture and enrollment flows
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Issue a registration challenge for a student
    async fn registration_challenge(
        &self,
        student_id: &str,
    ) -> Result<RegistrationChallenge, GatewayError>;

    /// Store a freshly registered credential for a student
    async fn submit_credential(
        &self,
        student_id: &str,
        credential: &CredentialSubmission,
    ) -> Result<(), GatewayError>;

    /// Issue a verification challenge scoped to a group
    async fn verification_challenge(
        &self,
        group_id: &str,
    ) -> Result<VerificationChallenge, GatewayError>;

    /// Resolve identity from a credential id and record attendance on a match
    async fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, GatewayError>;

    /// Record attendance without a fingerprint
    async fn record_manual_attendance(
        &self,
        student_id: &str,
    ) -> Result<AttendanceRecord, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verification_outcome_wire_format() {
        let outcome: VerificationOutcome = serde_json::from_value(json!({
            "found": true,
            "student": {"id": "s-1", "name": "Ana", "groupId": "g-1"},
            "attendance": {"date": "2026-03-02", "time": "08:01:12"}
        }))
        .unwrap();
        assert_eq!(outcome.resolved().map(|s| s.name.as_str()), Some("Ana"));
        assert!(outcome.suggestions.is_empty());

        let miss: VerificationOutcome = serde_json::from_value(json!({
            "found": false,
            "message": "not enrolled",
            "suggestions": ["clean the sensor"]
        }))
        .unwrap();
        assert!(miss.resolved().is_none());
        assert_eq!(miss.suggestions, vec!["clean the sensor".to_string()]);
    }

    #[test]
    fn test_challenge_field_names() {
        let challenge: VerificationChallenge = serde_json::from_value(json!({
            "challenge": "AAEC",
            "allowedCredentials": [{"id": "x"}, {"id": "y"}]
        }))
        .unwrap();
        assert_eq!(challenge.credential_ids(), vec!["x", "y"]);

        let body = serde_json::to_value(VerificationRequest {
            credential_id: "x".to_string(),
            group_id: None,
        })
        .unwrap();
        assert_eq!(body, json!({"credentialId": "x"}));

        let body = serde_json::to_value(ManualAttendanceRequest {
            student_id: "s-1".to_string(),
            method: AttendanceMethod::Manual,
        })
        .unwrap();
        assert_eq!(body, json!({"studentId": "s-1", "method": "manual"}));
    }
}

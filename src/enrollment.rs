//! Fingerprint enrollment
//!
//! Registers a platform credential for a student and hands it to the backend.
//! The student only counts as enrolled once the backend accepted the
//! credential; any failure leaves the student as it was.

use std::sync::Arc;

use crate::confirm::{self, ConfirmationRequest, Confirmer};
use crate::credential::CredentialBroker;
use crate::error::AttendanceError;
use crate::gateway::{BackendGateway, CredentialSubmission};
use crate::models::Student;
use crate::utils::logging::LoggingHelper;

/// What an enrollment attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    /// The credential was registered and stored; the student is now enrolled
    Enrolled(Student),
    /// The user declined the registration prompt
    Declined,
}

/// Runs the registration ceremony for one student at a time
pub struct EnrollmentController {
    broker: Arc<CredentialBroker>,
    gateway: Arc<dyn BackendGateway>,
    confirmer: Arc<dyn Confirmer>,
}

impl EnrollmentController {
    #[must_use]
    pub fn new(
        broker: Arc<CredentialBroker>,
        gateway: Arc<dyn BackendGateway>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            broker,
            gateway,
            confirmer,
        }
    }

    /// Register a fingerprint for `student`
    ///
    /// # Errors
    ///
    /// Returns a context error before prompting when biometric capture is not
    /// usable here, otherwise the classified ceremony or network error.
    pub async fn enroll(&self, student: &Student) -> Result<EnrollmentOutcome, AttendanceError> {
        if !self.broker.is_available() {
            return Err(AttendanceError::Context(self.broker.unavailable_message()));
        }

        let prompt = ConfirmationRequest::RegisterCredential {
            student: student.clone(),
        };
        if confirm::request(self.confirmer.as_ref(), &prompt).await.is_none() {
            log::debug!("Enrollment for {} declined", student.id);
            return Ok(EnrollmentOutcome::Declined);
        }

        match self.register(student).await {
            Ok(enrolled) => {
                LoggingHelper::log_capture_outcome("enrollment", Ok(enrolled.name.as_str()));
                Ok(EnrollmentOutcome::Enrolled(enrolled))
            }
            Err(e) => {
                LoggingHelper::log_capture_outcome("enrollment", Err(&e));
                Err(e)
            }
        }
    }

    async fn register(&self, student: &Student) -> Result<Student, AttendanceError> {
        let challenge = self.gateway.registration_challenge(&student.id).await?;
        let descriptor = self
            .broker
            .register_credential(&student.id, &challenge.user_name, &challenge.challenge)
            .await?;
        self.gateway
            .submit_credential(
                &student.id,
                &CredentialSubmission {
                    credential_id: descriptor.credential_id,
                    public_key: descriptor.public_key,
                },
            )
            .await?;

        Ok(Student {
            has_credential: true,
            ..student.clone()
        })
    }
}

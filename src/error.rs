//! Error taxonomy for ceremonies and attendance capture
//!
//! Every failure a controller can report is an [`AttendanceError`]. None of
//! them is fatal: controllers stay usable and roll their state back to the
//! value it had before the failed attempt.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Failures reported by the platform biometric ceremony, after classification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CeremonyError {
    /// The user dismissed the prompt or the sensor was not reachable
    #[error("ceremony cancelled by the user or the authenticator is unavailable")]
    UserCancelled,

    /// The authenticator already holds a credential for this user
    #[error("this credential is already registered on the device")]
    AlreadyRegistered,

    /// The device cannot perform user-verifying biometric authentication
    #[error("the device does not support biometric authentication")]
    UnsupportedAuthenticator,

    /// The platform refused the ceremony for security reasons
    #[error("security error: use HTTPS or localhost")]
    InsecureContext,

    /// Another ceremony is still waiting for the user
    #[error("another fingerprint capture is already in progress")]
    Busy,

    /// Anything else, including timeouts and empty platform responses
    #[error("ceremony failed: {0}")]
    CeremonyFailed(String),
}

/// Top-level error surfaced to the UI by every controller
#[derive(Error, Debug)]
pub enum AttendanceError {
    /// Insecure execution context or missing platform capability.
    /// Raised before any network call is made.
    #[error("biometric capture unavailable: {0}")]
    Context(String),

    #[error(transparent)]
    Ceremony(#[from] CeremonyError),

    #[error("backend unavailable: {0}")]
    Network(#[from] GatewayError),

    /// The fingerprint belongs to a different roster member
    #[error("the fingerprint belongs to another student: {0}")]
    IdentityMismatch(String),

    /// The backend could not resolve anybody from the credential
    #[error("{message}")]
    NotRecognized {
        message: String,
        suggestions: Vec<String>,
    },

    /// The request was rejected before doing any work
    #[error("{0}")]
    Validation(String),
}

impl AttendanceError {
    /// Default message used when the backend does not explain a miss
    pub const NOT_RECOGNIZED: &'static str =
        "Fingerprint not recognized. Check that the student is enrolled correctly.";

    /// Build a `NotRecognized` without backend-supplied remediation
    #[must_use]
    pub fn not_recognized() -> Self {
        Self::NotRecognized {
            message: Self::NOT_RECOGNIZED.to_string(),
            suggestions: Vec::new(),
        }
    }

    /// Remediation hints supplied by the backend, if any
    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::NotRecognized { suggestions, .. }
            | Self::Network(GatewayError::Rejected { suggestions, .. }) => suggestions.as_slice(),
            _ => &[],
        }
    }

    /// Whether the user can simply try the same action again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Context(_)
                | Self::Validation(_)
                | Self::Ceremony(
                    CeremonyError::UnsupportedAuthenticator | CeremonyError::InsecureContext
                )
        )
    }
}

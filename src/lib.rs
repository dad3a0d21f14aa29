#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Fingerprint roll-call
//!
//! A biometric credential broker over an injected platform authenticator,
//! plus the two attendance flows built on it: a sequential roll call over a
//! group's roster and a quick capture that identifies whoever touches the
//! sensor. An in-memory reference gateway serves the backend contract.

/// Version of the rollcall application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod confirm;
pub mod credential;
pub mod enrollment;
pub mod error;
pub mod gateway;
pub mod models;
pub mod quick_capture;
pub mod server;
pub mod session;
pub mod settings;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timer;
pub mod utils;

/// Re-export commonly used items
pub use confirm::{ConfirmationRequest, Confirmed, Confirmer};
pub use credential::{CredentialBroker, ExecutionContext, PlatformAuthenticator};
pub use enrollment::{EnrollmentController, EnrollmentOutcome};
pub use error::{AttendanceError, CeremonyError};
pub use gateway::{BackendGateway, GatewayError, HttpGateway};
pub use quick_capture::QuickCaptureController;
pub use session::{AttendanceSessionController, CaptureOutcome};
pub use settings::RollcallSettings;

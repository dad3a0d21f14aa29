//! Biometric credential ceremonies
//!
//! - [`codec`] - base64url transport encoding for binary material
//! - [`types`] - creation/request option sets handed to the platform
//! - [`platform`] - the injected platform authenticator port
//! - [`broker`] - runs the registration and verification ceremonies
//! - `software` - in-memory ES256 authenticator (feature `software-authenticator`)

pub mod broker;
#[cfg(feature = "software-authenticator")]
pub mod cbor;
pub mod codec;
pub mod platform;
#[cfg(feature = "software-authenticator")]
pub mod software;
pub mod types;

pub use broker::{classify, Availability, AvailabilityReason, Ceremony, CredentialBroker};
pub use platform::{
    ExecutionContext, PlatformAuthenticator, PlatformCapabilities, PlatformError,
    PlatformErrorKind,
};
#[cfg(feature = "software-authenticator")]
pub use software::SoftwareAuthenticator;
pub use types::{Assertion, AttestedCredential, CreationOptions, RequestOptions};

//! Platform authenticator port
//!
//! The broker never talks to a concrete biometric API. Hosts inject a
//! [`PlatformAuthenticator`] (a browser bridge, an OS passkey API, or the
//! software authenticator used in development) together with a description
//! of the [`ExecutionContext`] the ceremony runs in.

use async_trait::async_trait;
use url::{Host, Url};

use super::types::{Assertion, AttestedCredential, CreationOptions, RequestOptions};

/// Failure categories a platform reports for a ceremony.
///
/// The names follow the `DOMException` names browsers raise from
/// `navigator.credentials`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// `NotAllowedError`: user cancelled, timed out in the OS prompt, or no sensor
    NotAllowed,
    /// `InvalidStateError`: a matching credential already exists
    InvalidState,
    /// `NotSupportedError`: no authenticator satisfies the options
    NotSupported,
    /// `SecurityError`: the origin or relying party id is not acceptable
    Security,
    /// `AbortError`
    Aborted,
    /// Any other named failure
    Other(String),
}

/// A failure raised by the platform while running a ceremony
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct PlatformError {
    pub kind: PlatformErrorKind,
    pub message: String,
}

impl PlatformError {
    #[must_use]
    pub fn new(kind: PlatformErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

/// Capability interfaces exposed by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// The public-key credential type is known to the platform
    pub public_key_credential: bool,
    /// A credential container able to create and get credentials exists
    pub credential_container: bool,
}

impl PlatformCapabilities {
    #[must_use]
    pub const fn full() -> Self {
        Self {
            public_key_credential: true,
            credential_container: true,
        }
    }

    #[must_use]
    pub const fn none() -> Self {
        Self {
            public_key_credential: false,
            credential_container: false,
        }
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.public_key_credential && self.credential_container
    }
}

/// Where the ceremonies run: the serving origin plus the platform's own
/// secure-context verdict, when it has one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    origin: Url,
    platform_secure: bool,
}

impl ExecutionContext {
    /// Describe the context from the serving origin
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is not a valid absolute URL with a host.
    pub fn from_origin(origin: &str) -> Result<Self, url::ParseError> {
        let origin = Url::parse(origin)?;
        if origin.host().is_none() {
            return Err(url::ParseError::EmptyHost);
        }
        Ok(Self {
            origin,
            platform_secure: false,
        })
    }

    /// Record that the platform itself vouches for the context being secure
    #[must_use]
    pub fn with_platform_secure(mut self, secure: bool) -> Self {
        self.platform_secure = secure;
        self
    }

    /// Host the relying party identity is bound to
    #[must_use]
    pub fn host(&self) -> String {
        self.origin.host_str().unwrap_or_default().to_string()
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.origin.scheme()
    }

    /// Serialised origin (`scheme://host[:port]`)
    #[must_use]
    pub fn origin(&self) -> String {
        self.origin.origin().ascii_serialization()
    }

    /// Encrypted transport or a loopback host
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.platform_secure || self.origin.scheme() == "https" || self.is_loopback()
    }

    fn is_loopback(&self) -> bool {
        match self.origin.host() {
            Some(Host::Domain(domain)) => {
                domain == "localhost" || domain.ends_with(".localhost")
            }
            Some(Host::Ipv4(addr)) => addr.is_loopback(),
            Some(Host::Ipv6(addr)) => addr.is_loopback(),
            None => false,
        }
    }
}

/// The injected biometric capability
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// Capability interfaces this platform exposes
    fn capabilities(&self) -> PlatformCapabilities;

    /// Probe for a user-verifying platform authenticator.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform cannot answer the question at all.
    async fn is_user_verifying_platform_authenticator_available(
        &self,
    ) -> Result<bool, PlatformError>;

    /// Run a registration ceremony. `Ok(None)` means the platform completed
    /// without producing a credential.
    ///
    /// # Errors
    ///
    /// Returns the platform failure that ended the ceremony.
    async fn create(
        &self,
        options: &CreationOptions,
    ) -> Result<Option<AttestedCredential>, PlatformError>;

    /// Run a verification ceremony. `Ok(None)` means no assertion was produced.
    ///
    /// # Errors
    ///
    /// Returns the platform failure that ended the ceremony.
    async fn get(&self, options: &RequestOptions) -> Result<Option<Assertion>, PlatformError>;
}

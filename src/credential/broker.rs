//! Credential ceremony broker
//!
//! Turns the injected platform capability into the two ceremonies used by the
//! attendance flows, applying the exact option set and binary encoding rules
//! the backend expects. The broker never retries a ceremony.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AttendanceError, CeremonyError};
use crate::models::{AssertionResult, CredentialDescriptor};
use crate::settings::RollcallSettings;
use crate::utils::logging::LoggingHelper;

use super::codec;
use super::platform::{ExecutionContext, PlatformAuthenticator, PlatformError, PlatformErrorKind};
use super::types::{
    AttestationConveyance, AuthenticatorAttachment, AuthenticatorSelectionCriteria,
    CreationOptions, PublicKeyCredentialDescriptor, PublicKeyCredentialParameters,
    RelyingParty, RequestOptions, UserEntity, UserVerification, CEREMONY_TIMEOUT_MS,
    COSE_ALG_ES256, COSE_ALG_RS256,
};

/// The two ceremonies the broker runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ceremony {
    Registration,
    Verification,
}

impl fmt::Display for Ceremony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ceremony::Registration => write!(f, "registration"),
            Ceremony::Verification => write!(f, "verification"),
        }
    }
}

/// Why the broker considers biometric capture usable or not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityReason {
    /// A user-verifying platform authenticator answered the probe
    Ready,
    /// The probe answered that no such authenticator exists
    NoAuthenticator,
    /// The probe could not run; the ceremony itself will decide
    ProbeInconclusive,
    /// Missing capability interfaces or an insecure context
    Unsupported,
}

/// Result of [`CredentialBroker::check_availability`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    pub reason: AvailabilityReason,
}

impl Availability {
    /// Message suitable for showing next to the capture button
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self.reason {
            AvailabilityReason::Ready => "Fingerprint reader available",
            AvailabilityReason::NoAuthenticator => {
                "No fingerprint reader was detected on this device"
            }
            AvailabilityReason::ProbeInconclusive => {
                "Could not check the fingerprint reader; capture will be attempted anyway"
            }
            AvailabilityReason::Unsupported => {
                "Biometric capture is not available. Use HTTPS or localhost on a supported device."
            }
        }
    }
}

/// Map a platform failure onto the ceremony error taxonomy
#[must_use]
pub fn classify(error: &PlatformError) -> CeremonyError {
    match &error.kind {
        PlatformErrorKind::NotAllowed => CeremonyError::UserCancelled,
        PlatformErrorKind::InvalidState => CeremonyError::AlreadyRegistered,
        PlatformErrorKind::NotSupported => CeremonyError::UnsupportedAuthenticator,
        PlatformErrorKind::Security => CeremonyError::InsecureContext,
        PlatformErrorKind::Aborted | PlatformErrorKind::Other(_) => {
            CeremonyError::CeremonyFailed(error.message.clone())
        }
    }
}

/// Clears the in-flight flag when a ceremony ends, even if its future is dropped
struct CeremonyGuard<'a>(&'a AtomicBool);

impl Drop for CeremonyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Biometric ceremony broker
pub struct CredentialBroker {
    platform: Arc<dyn PlatformAuthenticator>,
    context: ExecutionContext,
    rp_name: String,
    in_flight: AtomicBool,
}

impl CredentialBroker {
    /// Create a broker over the given platform and execution context
    #[must_use]
    pub fn new(
        platform: Arc<dyn PlatformAuthenticator>,
        context: ExecutionContext,
        rp_name: &str,
    ) -> Self {
        Self {
            platform,
            context,
            rp_name: rp_name.to_string(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Create a broker whose relying party name comes from the
    /// `[relying_party]` settings section
    #[must_use]
    pub fn from_settings(
        platform: Arc<dyn PlatformAuthenticator>,
        context: ExecutionContext,
        settings: &RollcallSettings,
    ) -> Self {
        Self::new(platform, context, &settings.relying_party.name)
    }

    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Capability interfaces present and the context is secure
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.platform.capabilities().is_complete() && self.context.is_secure()
    }

    /// Probe for a platform authenticator.
    ///
    /// An inconclusive probe reports the authenticator as available so the
    /// user is never blocked from at least attempting a capture.
    pub async fn check_availability(&self) -> Availability {
        if !self.is_available() {
            return Availability {
                available: false,
                reason: AvailabilityReason::Unsupported,
            };
        }

        let availability = match self
            .platform
            .is_user_verifying_platform_authenticator_available()
            .await
        {
            Ok(true) => Availability {
                available: true,
                reason: AvailabilityReason::Ready,
            },
            Ok(false) => Availability {
                available: false,
                reason: AvailabilityReason::NoAuthenticator,
            },
            Err(e) => {
                log::warn!("Could not probe platform authenticator: {e}");
                Availability {
                    available: true,
                    reason: AvailabilityReason::ProbeInconclusive,
                }
            }
        };
        LoggingHelper::log_availability(&availability);
        availability
    }

    /// Message explaining why capture cannot start in this context
    #[must_use]
    pub fn unavailable_message(&self) -> String {
        if self.context.is_secure() {
            "The fingerprint reader is not available. Use a device with a built-in fingerprint reader."
                .to_string()
        } else {
            format!(
                "The fingerprint reader is not available. Biometric capture requires HTTPS or localhost; \
                 this page is served from {}://{}.",
                self.context.scheme(),
                self.context.host()
            )
        }
    }

    /// Build the creation options for a registration ceremony
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is not valid base64url.
    pub fn creation_options(
        &self,
        user_id: &str,
        user_name: &str,
        challenge: &str,
    ) -> Result<CreationOptions, CeremonyError> {
        Ok(CreationOptions {
            challenge: decode_challenge(challenge)?,
            rp: RelyingParty {
                id: self.context.host(),
                name: self.rp_name.clone(),
            },
            user: UserEntity {
                id: user_id.as_bytes().to_vec(),
                name: user_name.to_string(),
                display_name: user_name.to_string(),
            },
            pub_key_cred_params: vec![
                // ES256 (ECDSA P-256 with SHA-256)
                PublicKeyCredentialParameters::public_key(COSE_ALG_ES256),
                // RS256 (RSASSA-PKCS1-v1_5 with SHA-256)
                PublicKeyCredentialParameters::public_key(COSE_ALG_RS256),
            ],
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: AuthenticatorAttachment::Platform,
                user_verification: UserVerification::Required,
            },
            timeout: CEREMONY_TIMEOUT_MS,
            attestation: AttestationConveyance::Direct,
        })
    }

    /// Build the request options for a verification ceremony
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge or any allowed credential id is not
    /// valid base64url.
    pub fn request_options(
        challenge: &str,
        allowed_credentials: Option<&[String]>,
    ) -> Result<RequestOptions, CeremonyError> {
        let allow_credentials = match allowed_credentials {
            Some(ids) if !ids.is_empty() => Some(
                ids.iter()
                    .map(|id| {
                        codec::decode(id)
                            .map(|id| PublicKeyCredentialDescriptor {
                                r#type: "public-key",
                                id,
                            })
                            .map_err(|e| {
                                CeremonyError::CeremonyFailed(format!(
                                    "malformed allowed credential id: {e}"
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            _ => None,
        };

        Ok(RequestOptions {
            challenge: decode_challenge(challenge)?,
            timeout: CEREMONY_TIMEOUT_MS,
            user_verification: UserVerification::Required,
            allow_credentials,
        })
    }

    /// Run a registration ceremony for a student
    ///
    /// # Errors
    ///
    /// Returns `Context` when the platform or context is unusable, and a
    /// classified `Ceremony` error when the ceremony fails, times out, or
    /// yields no credential.
    pub async fn register_credential(
        &self,
        user_id: &str,
        user_name: &str,
        challenge: &str,
    ) -> Result<CredentialDescriptor, AttendanceError> {
        self.ensure_available()?;
        let options = self.creation_options(user_id, user_name, challenge)?;
        let _guard = self.begin(Ceremony::Registration)?;

        LoggingHelper::log_ceremony_started(Ceremony::Registration, 0);
        let outcome = self
            .with_timeout(Ceremony::Registration, self.platform.create(&options))
            .await?;

        let Some(credential) = outcome else {
            let error = CeremonyError::CeremonyFailed("no credential was created".to_string());
            LoggingHelper::log_ceremony_failed(Ceremony::Registration, &error);
            return Err(error.into());
        };

        let descriptor = CredentialDescriptor {
            credential_id: codec::encode(&credential.raw_id),
            public_key: credential.public_key.as_deref().map(codec::encode),
            attestation_object: Some(codec::encode(&credential.attestation_object)),
            client_data_json: Some(codec::encode(&credential.client_data_json)),
        };
        LoggingHelper::log_ceremony_completed(Ceremony::Registration, &descriptor.credential_id);
        Ok(descriptor)
    }

    /// Run a verification ceremony, optionally restricted to known credentials
    ///
    /// # Errors
    ///
    /// Returns `Context` when the platform or context is unusable, and a
    /// classified `Ceremony` error when the ceremony fails, times out, or
    /// yields no assertion.
    pub async fn verify_credential(
        &self,
        challenge: &str,
        allowed_credentials: Option<&[String]>,
    ) -> Result<AssertionResult, AttendanceError> {
        self.ensure_available()?;
        let options = Self::request_options(challenge, allowed_credentials)?;
        let _guard = self.begin(Ceremony::Verification)?;

        let restricted = options.allow_credentials.as_ref().map_or(0, Vec::len);
        LoggingHelper::log_ceremony_started(Ceremony::Verification, restricted);
        let outcome = self
            .with_timeout(Ceremony::Verification, self.platform.get(&options))
            .await?;

        let Some(assertion) = outcome else {
            let error = CeremonyError::CeremonyFailed("no assertion was produced".to_string());
            LoggingHelper::log_ceremony_failed(Ceremony::Verification, &error);
            return Err(error.into());
        };

        let result = AssertionResult {
            credential_id: codec::encode(&assertion.raw_id),
            authenticator_data: codec::encode(&assertion.authenticator_data),
            client_data_json: codec::encode(&assertion.client_data_json),
            signature: codec::encode(&assertion.signature),
        };
        LoggingHelper::log_ceremony_completed(Ceremony::Verification, &result.credential_id);
        Ok(result)
    }

    fn ensure_available(&self) -> Result<(), AttendanceError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(AttendanceError::Context(self.unavailable_message()))
        }
    }

    /// Claim the single ceremony slot or fail fast
    fn begin(&self, ceremony: Ceremony) -> Result<CeremonyGuard<'_>, CeremonyError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| CeremonyGuard(&self.in_flight))
            .map_err(|_| {
                LoggingHelper::log_ceremony_failed(ceremony, &CeremonyError::Busy);
                CeremonyError::Busy
            })
    }

    async fn with_timeout<T, F>(&self, ceremony: Ceremony, fut: F) -> Result<T, CeremonyError>
    where
        F: std::future::Future<Output = Result<T, PlatformError>>,
    {
        let limit = Duration::from_millis(u64::from(CEREMONY_TIMEOUT_MS));
        let error = match tokio::time::timeout(limit, fut).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => classify(&e),
            Err(_) => CeremonyError::CeremonyFailed(format!(
                "no response from the fingerprint reader after {CEREMONY_TIMEOUT_MS} ms"
            )),
        };
        LoggingHelper::log_ceremony_failed(ceremony, &error);
        Err(error)
    }
}

fn decode_challenge(challenge: &str) -> Result<Vec<u8>, CeremonyError> {
    codec::decode(challenge)
        .map_err(|e| CeremonyError::CeremonyFailed(format!("malformed challenge: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::platform::PlatformCapabilities;
    use crate::testing::mock::{ScriptedAuthenticator, ScriptedCeremony};

    fn broker_with(platform: Arc<ScriptedAuthenticator>, origin: &str) -> CredentialBroker {
        CredentialBroker::new(
            platform,
            ExecutionContext::from_origin(origin).unwrap(),
            "Roll Call",
        )
    }

    #[test]
    fn test_relying_party_name_from_settings() {
        let mut settings = RollcallSettings::default();
        settings.relying_party.name = "Escuela Norte".to_string();
        let broker = CredentialBroker::from_settings(
            Arc::new(ScriptedAuthenticator::new()),
            ExecutionContext::from_origin("https://school.example").unwrap(),
            &settings,
        );

        let options = broker
            .creation_options("s-1", "Ana Lopez", &codec::encode(b"nonce"))
            .unwrap();
        assert_eq!(options.rp.name, "Escuela Norte");
        assert_eq!(options.rp.id, "school.example");
    }

    #[test]
    fn test_registration_options_are_fixed() {
        let broker = broker_with(
            Arc::new(ScriptedAuthenticator::new()),
            "https://school.example",
        );
        let options = broker
            .creation_options("s-1", "Ana Lopez", &codec::encode(b"nonce"))
            .unwrap();

        let algs: Vec<i32> = options.pub_key_cred_params.iter().map(|p| p.alg).collect();
        assert_eq!(algs, vec![-7, -257]);
        assert_eq!(
            options.authenticator_selection.user_verification,
            UserVerification::Required
        );
        assert_eq!(
            options.authenticator_selection.authenticator_attachment,
            AuthenticatorAttachment::Platform
        );
        assert_eq!(options.timeout, 60_000);
        assert_eq!(options.attestation, AttestationConveyance::Direct);
        assert_eq!(options.rp.id, "school.example");
        assert_eq!(options.user.id, b"s-1".to_vec());
        assert_eq!(options.user.display_name, "Ana Lopez");
        assert_eq!(options.challenge, b"nonce".to_vec());
    }

    #[test]
    fn test_request_options_restriction() {
        let challenge = codec::encode(b"abc");
        let ids = vec![codec::encode(&[1, 2]), codec::encode(&[3])];

        let restricted = CredentialBroker::request_options(&challenge, Some(&ids)).unwrap();
        let allow = restricted.allow_credentials.expect("restriction must be present");
        assert_eq!(allow.len(), 2);
        assert_eq!(allow[0].id, vec![1, 2]);
        assert_eq!(allow[1].id, vec![3]);
        assert_eq!(restricted.user_verification, UserVerification::Required);

        let empty = CredentialBroker::request_options(&challenge, Some(&[])).unwrap();
        assert!(empty.allow_credentials.is_none());
        let none = CredentialBroker::request_options(&challenge, None).unwrap();
        assert!(none.allow_credentials.is_none());
    }

    #[test]
    fn test_malformed_challenge_is_a_ceremony_failure() {
        let err = CredentialBroker::request_options("***", None).unwrap_err();
        assert!(matches!(err, CeremonyError::CeremonyFailed(_)));
    }

    #[test]
    fn test_classification_table() {
        let cases = [
            (PlatformErrorKind::NotAllowed, CeremonyError::UserCancelled),
            (PlatformErrorKind::InvalidState, CeremonyError::AlreadyRegistered),
            (
                PlatformErrorKind::NotSupported,
                CeremonyError::UnsupportedAuthenticator,
            ),
            (PlatformErrorKind::Security, CeremonyError::InsecureContext),
            (
                PlatformErrorKind::Other("UnknownError".to_string()),
                CeremonyError::CeremonyFailed("boom".to_string()),
            ),
        ];
        for (kind, expected) in cases {
            assert_eq!(classify(&PlatformError::new(kind, "boom")), expected);
        }
    }

    #[test]
    fn test_is_available_needs_capabilities_and_secure_context() {
        let broker = broker_with(Arc::new(ScriptedAuthenticator::new()), "http://localhost");
        assert!(broker.is_available());

        let broker = broker_with(Arc::new(ScriptedAuthenticator::new()), "http://10.0.0.5");
        assert!(!broker.is_available());

        let platform = ScriptedAuthenticator::new().with_capabilities(PlatformCapabilities {
            public_key_credential: true,
            credential_container: false,
        });
        let broker = broker_with(Arc::new(platform), "https://school.example");
        assert!(!broker.is_available());
    }

    #[tokio::test]
    async fn test_inconclusive_probe_assumes_available() {
        let platform = ScriptedAuthenticator::new().with_probe(Err(PlatformError::new(
            PlatformErrorKind::NotSupported,
            "probe missing",
        )));
        let broker = broker_with(Arc::new(platform), "https://school.example");
        let availability = broker.check_availability().await;
        assert!(availability.available);
        assert_eq!(availability.reason, AvailabilityReason::ProbeInconclusive);
    }

    #[tokio::test]
    async fn test_probe_reports_missing_authenticator() {
        let platform = ScriptedAuthenticator::new().with_probe(Ok(false));
        let broker = broker_with(Arc::new(platform), "https://school.example");
        let availability = broker.check_availability().await;
        assert!(!availability.available);
        assert_eq!(availability.reason, AvailabilityReason::NoAuthenticator);
    }

    #[tokio::test]
    async fn test_insecure_context_fails_before_ceremony() {
        let platform = Arc::new(ScriptedAuthenticator::new());
        let broker = broker_with(Arc::clone(&platform), "http://192.168.0.9:3000");
        let err = broker
            .verify_credential(&codec::encode(b"c"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Context(msg) if msg.contains("http://192.168.0.9")));
        assert_eq!(platform.ceremony_count(), 0);
    }

    #[tokio::test]
    async fn test_register_encodes_credential_material() {
        let platform = Arc::new(ScriptedAuthenticator::new());
        platform.push(ScriptedCeremony::Register {
            raw_id: vec![0xfb, 0xff, 0x01],
            public_key: Some(vec![4, 5, 6]),
        });
        let broker = broker_with(Arc::clone(&platform), "https://school.example");

        let descriptor = broker
            .register_credential("s-1", "Ana", &codec::encode(b"challenge"))
            .await
            .unwrap();
        assert_eq!(descriptor.credential_id, "-_8B");
        assert_eq!(descriptor.public_key.as_deref(), Some("BAUG"));
        assert!(descriptor.attestation_object.is_some());
        assert!(descriptor.client_data_json.is_some());
    }

    #[tokio::test]
    async fn test_empty_platform_response_is_ceremony_error() {
        let platform = Arc::new(ScriptedAuthenticator::new());
        platform.push(ScriptedCeremony::Empty);
        let broker = broker_with(Arc::clone(&platform), "https://school.example");
        let err = broker
            .verify_credential(&codec::encode(b"c"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::Ceremony(CeremonyError::CeremonyFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_forwards_restriction_to_platform() {
        let platform = Arc::new(ScriptedAuthenticator::new());
        platform.push(ScriptedCeremony::Assert {
            raw_id: vec![9, 9],
        });
        let broker = broker_with(Arc::clone(&platform), "https://school.example");
        let ids = vec![codec::encode(&[9, 9])];

        let result = broker
            .verify_credential(&codec::encode(b"c"), Some(&ids))
            .await
            .unwrap();
        assert_eq!(result.credential_id, codec::encode(&[9, 9]));

        let seen = platform.last_request_options().unwrap();
        assert_eq!(seen.allow_credentials.unwrap()[0].id, vec![9, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceremony_times_out_after_sixty_seconds() {
        let platform = Arc::new(ScriptedAuthenticator::new());
        platform.push(ScriptedCeremony::Hang);
        let broker = broker_with(Arc::clone(&platform), "https://school.example");

        let started = tokio::time::Instant::now();
        let err = broker
            .verify_credential(&codec::encode(b"c"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::Ceremony(CeremonyError::CeremonyFailed(_))
        ));
        assert!(started.elapsed() >= Duration::from_millis(60_000));

        // The slot is released after a timeout
        platform.push(ScriptedCeremony::Assert { raw_id: vec![1] });
        assert!(broker.verify_credential(&codec::encode(b"c"), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_ceremony_fails_fast() {
        let platform = Arc::new(ScriptedAuthenticator::new());
        let release = platform.push_gated(ScriptedCeremony::Assert { raw_id: vec![1] });
        let broker = Arc::new(broker_with(Arc::clone(&platform), "https://school.example"));

        let first = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.verify_credential(&codec::encode(b"c"), None).await })
        };
        platform.wait_for_pending().await;

        let err = broker
            .verify_credential(&codec::encode(b"c"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AttendanceError::Ceremony(CeremonyError::Busy)));

        release.release();
        assert!(first.await.unwrap().is_ok());
    }
}

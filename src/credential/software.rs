//! Software platform authenticator
//!
//! A [`PlatformAuthenticator`] that keeps ES256 credentials in memory and
//! signs with real keys. It stands in for a fingerprint sensor during local
//! development and integration testing: whichever enrolled user is currently
//! "presented" is the finger that touches the sensor.

use std::sync::Mutex;

use async_trait::async_trait;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use serde_json::json;

use crate::utils::lock;

use super::cbor;
use super::codec;
use super::platform::{
    ExecutionContext, PlatformAuthenticator, PlatformCapabilities, PlatformError,
    PlatformErrorKind,
};
use super::types::{
    Assertion, AttestedCredential, AuthenticatorAttachment, CreationOptions, RequestOptions,
    COSE_ALG_ES256,
};

/// DER prefix of a P-256 `SubjectPublicKeyInfo`, followed by the 65-byte point
const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08,
    0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

struct StoredCredential {
    id: Vec<u8>,
    rp_id: String,
    user_handle: Vec<u8>,
    key_pair: EcdsaKeyPair,
    counter: u32,
}

/// In-memory ES256 authenticator
pub struct SoftwareAuthenticator {
    rng: SystemRandom,
    rp_id: String,
    origin: String,
    credentials: Mutex<Vec<StoredCredential>>,
    presented: Mutex<Option<Vec<u8>>>,
}

fn unknown(message: &str) -> PlatformError {
    PlatformError::new(PlatformErrorKind::Other("UnknownError".to_string()), message)
}

impl SoftwareAuthenticator {
    /// Create an authenticator bound to the serving context
    #[must_use]
    pub fn new(context: &ExecutionContext) -> Self {
        Self {
            rng: SystemRandom::new(),
            rp_id: context.host(),
            origin: context.origin(),
            credentials: Mutex::new(Vec::new()),
            presented: Mutex::new(None),
        }
    }

    /// Simulate the given user touching the sensor
    pub fn present(&self, user_id: &str) {
        *lock(&self.presented) = Some(user_id.as_bytes().to_vec());
    }

    /// Nobody is touching the sensor
    pub fn withdraw(&self) {
        *lock(&self.presented) = None;
    }

    /// Number of credentials held
    #[must_use]
    pub fn credential_count(&self) -> usize {
        lock(&self.credentials).len()
    }

    fn client_data(&self, ceremony_type: &str, challenge: &[u8]) -> Vec<u8> {
        json!({
            "type": ceremony_type,
            "challenge": codec::encode(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    fn random_id(&self) -> Result<Vec<u8>, PlatformError> {
        let mut id = vec![0u8; 16];
        self.rng
            .fill(&mut id)
            .map_err(|_| unknown("failed to generate credential id"))?;
        Ok(id)
    }
}

#[async_trait]
impl PlatformAuthenticator for SoftwareAuthenticator {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities::full()
    }

    async fn is_user_verifying_platform_authenticator_available(
        &self,
    ) -> Result<bool, PlatformError> {
        Ok(true)
    }

    async fn create(
        &self,
        options: &CreationOptions,
    ) -> Result<Option<AttestedCredential>, PlatformError> {
        if options.rp.id != self.rp_id {
            return Err(PlatformError::new(
                PlatformErrorKind::Security,
                "relying party id does not match the origin",
            ));
        }
        if options.authenticator_selection.authenticator_attachment
            == AuthenticatorAttachment::CrossPlatform
            || !options
                .pub_key_cred_params
                .iter()
                .any(|p| p.alg == COSE_ALG_ES256)
        {
            return Err(PlatformError::new(
                PlatformErrorKind::NotSupported,
                "no supported algorithm or attachment",
            ));
        }

        let mut credentials = lock(&self.credentials);
        if credentials
            .iter()
            .any(|c| c.rp_id == options.rp.id && c.user_handle == options.user.id)
        {
            return Err(PlatformError::new(
                PlatformErrorKind::InvalidState,
                "a credential for this user already exists",
            ));
        }

        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.rng)
            .map_err(|_| unknown("key generation failed"))?;
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &self.rng)
                .map_err(|_| unknown("generated key was rejected"))?;
        let point = key_pair.public_key().as_ref().to_vec();
        let id = self.random_id()?;

        let cose_key = cbor::cose_es256_key(&point).map_err(|e| unknown(&e.to_string()))?;
        let auth_data = cbor::authenticator_data(
            &options.rp.id,
            cbor::FLAG_USER_PRESENT | cbor::FLAG_USER_VERIFIED | cbor::FLAG_ATTESTED_DATA,
            0,
            Some((id.as_slice(), cose_key.as_slice())),
        );
        let attestation_object =
            cbor::none_attestation_object(&auth_data).map_err(|e| unknown(&e.to_string()))?;

        let mut spki = P256_SPKI_PREFIX.to_vec();
        spki.extend_from_slice(&point);

        credentials.push(StoredCredential {
            id: id.clone(),
            rp_id: options.rp.id.clone(),
            user_handle: options.user.id.clone(),
            key_pair,
            counter: 0,
        });
        log::debug!(
            "Software authenticator created credential #{}",
            credentials.len()
        );

        Ok(Some(AttestedCredential {
            raw_id: id,
            public_key: Some(spki),
            attestation_object,
            client_data_json: self.client_data("webauthn.create", &options.challenge),
        }))
    }

    async fn get(&self, options: &RequestOptions) -> Result<Option<Assertion>, PlatformError> {
        let Some(presented) = lock(&self.presented).clone() else {
            return Err(PlatformError::new(
                PlatformErrorKind::NotAllowed,
                "no finger on the sensor",
            ));
        };

        let mut credentials = lock(&self.credentials);
        let allowed = |id: &[u8]| {
            options
                .allow_credentials
                .as_ref()
                .map_or(true, |list| list.iter().any(|d| d.id == id))
        };
        let Some(credential) = credentials.iter_mut().find(|c| {
            c.rp_id == self.rp_id && c.user_handle == presented && allowed(c.id.as_slice())
        }) else {
            return Err(PlatformError::new(
                PlatformErrorKind::NotAllowed,
                "no matching credential on this device",
            ));
        };

        credential.counter += 1;
        let auth_data = cbor::authenticator_data(
            &credential.rp_id,
            cbor::FLAG_USER_PRESENT | cbor::FLAG_USER_VERIFIED,
            credential.counter,
            None,
        );
        let client_data_json = self.client_data("webauthn.get", &options.challenge);

        let mut signed = auth_data.clone();
        signed.extend_from_slice(digest::digest(&digest::SHA256, &client_data_json).as_ref());
        let signature = credential
            .key_pair
            .sign(&self.rng, &signed)
            .map_err(|_| unknown("signing failed"))?;

        Ok(Some(Assertion {
            raw_id: credential.id.clone(),
            authenticator_data: auth_data,
            client_data_json,
            signature: signature.as_ref().to_vec(),
            user_handle: Some(credential.user_handle.clone()),
        }))
    }
}

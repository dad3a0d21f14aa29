//! Ceremony request and response types
//!
//! These mirror the `PublicKeyCredentialCreationOptions` /
//! `PublicKeyCredentialRequestOptions` dictionaries handed to the platform
//! authenticator. Binary members hold raw bytes here; they are serialised as
//! base64url so the options can be logged or forwarded to a browser bridge.

use serde::{Deserialize, Serialize, Serializer};

use super::codec;

/// COSE algorithm identifier for ECDSA P-256 with SHA-256
pub const COSE_ALG_ES256: i32 = -7;
/// COSE algorithm identifier for RSASSA-PKCS1-v1_5 with SHA-256
pub const COSE_ALG_RS256: i32 = -257;

/// Ceremony timeout applied to both registration and verification
pub const CEREMONY_TIMEOUT_MS: u32 = 60_000;

fn as_base64url<S: Serializer, B: AsRef<[u8]>>(bytes: &B, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&codec::encode(bytes.as_ref()))
}

/// User verification requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

/// Which kind of authenticator may take part in the ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    /// The device's built-in sensor
    Platform,
    CrossPlatform,
}

/// Attestation conveyance preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    None,
    Indirect,
    Direct,
}

/// `WebAuthn` relying party information
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,   // Host name (e.g., "school.example")
    pub name: String, // Display name
}

/// `WebAuthn` user entity
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UserEntity {
    #[serde(serialize_with = "as_base64url")]
    pub id: Vec<u8>, // UTF-8 bytes of the student id
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// Public key credential parameters
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub r#type: &'static str, // Always "public-key"
    pub alg: i32,
}

impl PublicKeyCredentialParameters {
    #[must_use]
    pub const fn public_key(alg: i32) -> Self {
        Self {
            r#type: "public-key",
            alg,
        }
    }
}

/// Authenticator selection criteria
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthenticatorSelectionCriteria {
    #[serde(rename = "authenticatorAttachment")]
    pub authenticator_attachment: AuthenticatorAttachment,
    #[serde(rename = "userVerification")]
    pub user_verification: UserVerification,
}

/// Public key credential descriptor used by allow-lists
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub r#type: &'static str, // Always "public-key"
    #[serde(serialize_with = "as_base64url")]
    pub id: Vec<u8>,
}

/// Options for a registration ceremony
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptions {
    #[serde(serialize_with = "as_base64url")]
    pub challenge: Vec<u8>,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    pub timeout: u32, // Milliseconds
    pub attestation: AttestationConveyance,
}

/// Options for a verification ceremony
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(serialize_with = "as_base64url")]
    pub challenge: Vec<u8>,
    pub timeout: u32, // Milliseconds
    pub user_verification: UserVerification,
    /// Omitted entirely when the ceremony is unrestricted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,
}

/// Raw attestation returned by the platform for a new credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub raw_id: Vec<u8>,
    /// `SubjectPublicKeyInfo` DER; absent when the platform cannot export it
    pub public_key: Option<Vec<u8>>,
    pub attestation_object: Vec<u8>,
    pub client_data_json: Vec<u8>,
}

/// Raw assertion returned by the platform for an existing credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub raw_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_options_omit_empty_restriction() {
        let options = RequestOptions {
            challenge: vec![1, 2, 3],
            timeout: CEREMONY_TIMEOUT_MS,
            user_verification: UserVerification::Required,
            allow_credentials: None,
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["challenge"], "AQID");
        assert_eq!(json["userVerification"], "required");
        assert!(json.get("allowCredentials").is_none());
    }

    #[test]
    fn test_creation_options_wire_names() {
        let options = CreationOptions {
            challenge: vec![0xff],
            rp: RelyingParty {
                id: "localhost".to_string(),
                name: "Roll Call".to_string(),
            },
            user: UserEntity {
                id: b"42".to_vec(),
                name: "Ana".to_string(),
                display_name: "Ana".to_string(),
            },
            pub_key_cred_params: vec![
                PublicKeyCredentialParameters::public_key(COSE_ALG_ES256),
                PublicKeyCredentialParameters::public_key(COSE_ALG_RS256),
            ],
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: AuthenticatorAttachment::Platform,
                user_verification: UserVerification::Required,
            },
            timeout: CEREMONY_TIMEOUT_MS,
            attestation: AttestationConveyance::Direct,
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["user"]["id"], "NDI");
        assert_eq!(json["user"]["displayName"], "Ana");
        assert_eq!(json["pubKeyCredParams"][1]["alg"], -257);
        assert_eq!(json["pubKeyCredParams"][0]["type"], "public-key");
        assert_eq!(
            json["authenticatorSelection"]["authenticatorAttachment"],
            "platform"
        );
        assert_eq!(json["attestation"], "direct");
        assert_eq!(json["timeout"], 60_000);
    }
}

//! Domain records shared by the controllers, the gateway client and the
//! reference gateway server.

use serde::{Deserialize, Serialize};

/// An enrolled person as seen by the capture controllers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Flips to `true` only after a credential registration round-trip succeeds
    #[serde(default)]
    pub has_credential: bool,
}

impl Student {
    #[must_use]
    pub fn new(id: &str, name: &str, has_credential: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            has_credential,
        }
    }
}

/// A class group. Never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub career: Option<String>,
    #[serde(default)]
    pub student_count: usize,
}

/// Output of a registration ceremony, base64url encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDescriptor {
    pub credential_id: String,
    pub public_key: Option<String>,
    pub attestation_object: Option<String>,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Option<String>,
}

/// Output of a verification ceremony, base64url encoded.
/// The signature is forwarded as-is and never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub credential_id: String,
    pub authenticator_data: String,
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub signature: String,
}

/// How an attendance was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceMethod {
    Biometric,
    Manual,
}

/// Attendance entry owned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
    pub method: AttendanceMethod,
}

/// Student identity resolved by the backend from a credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStudent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group_id: Option<String>,
}

/// Date and time the backend stamped on a recorded attendance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceStamp {
    pub date: String,
    pub time: String,
}

//! CBOR processing for credential material
//!
//! Encodes the COSE keys and `none`-format attestation objects produced by the
//! software authenticator, and reads the credential public key back out of an
//! attestation object.

use ciborium::de::from_reader;
use ciborium::ser::into_writer;
use ciborium::value::{Integer, Value};
use ring::digest;

/// Flag bit: user present
pub const FLAG_USER_PRESENT: u8 = 0x01;
/// Flag bit: user verified
pub const FLAG_USER_VERIFIED: u8 = 0x04;
/// Flag bit: attested credential data included
pub const FLAG_ATTESTED_DATA: u8 = 0x40;

/// Errors raised while encoding or reading CBOR structures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CborError {
    #[error("CBOR encoding failed: {0}")]
    Encode(String),
    #[error("malformed attestation: {0}")]
    Malformed(&'static str),
}

fn int(value: i64) -> Value {
    Value::Integer(Integer::from(value))
}

fn to_bytes(value: &Value) -> Result<Vec<u8>, CborError> {
    let mut bytes = Vec::new();
    into_writer(value, &mut bytes).map_err(|e| CborError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// COSE_Key for an uncompressed P-256 point (`0x04 || x || y`)
///
/// # Errors
///
/// Returns an error if the point is not 65 bytes long or encoding fails.
pub fn cose_es256_key(uncompressed_point: &[u8]) -> Result<Vec<u8>, CborError> {
    if uncompressed_point.len() != 65 || uncompressed_point[0] != 0x04 {
        return Err(CborError::Malformed("expected an uncompressed P-256 point"));
    }
    let key = Value::Map(vec![
        (int(1), int(2)),  // kty: EC2
        (int(3), int(-7)), // alg: ES256
        (int(-1), int(1)), // crv: P-256
        (int(-2), Value::Bytes(uncompressed_point[1..33].to_vec())),
        (int(-3), Value::Bytes(uncompressed_point[33..].to_vec())),
    ]);
    to_bytes(&key)
}

/// Build authenticator data
///
/// Layout:
/// - 32 bytes: RP ID hash
/// - 1 byte: flags
/// - 4 bytes: signature counter (big endian)
/// - attested credential data, when present:
///   - 16 bytes: AAGUID (all zero)
///   - 2 bytes: credential ID length
///   - credential ID
///   - COSE public key
#[must_use]
pub fn authenticator_data(
    rp_id: &str,
    flags: u8,
    counter: u32,
    attested: Option<(&[u8], &[u8])>,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(37);
    data.extend_from_slice(digest::digest(&digest::SHA256, rp_id.as_bytes()).as_ref());
    data.push(flags);
    data.extend_from_slice(&counter.to_be_bytes());

    if let Some((credential_id, cose_key)) = attested {
        data.extend_from_slice(&[0u8; 16]);
        // Credential ids are generated locally and always fit in u16
        let id_len = u16::try_from(credential_id.len()).unwrap_or(u16::MAX);
        data.extend_from_slice(&id_len.to_be_bytes());
        data.extend_from_slice(credential_id);
        data.extend_from_slice(cose_key);
    }
    data
}

/// Wrap authenticator data into a `none`-format attestation object
///
/// # Errors
///
/// Returns an error if CBOR encoding fails.
pub fn none_attestation_object(auth_data: &[u8]) -> Result<Vec<u8>, CborError> {
    let object = Value::Map(vec![
        (Value::Text("fmt".to_string()), Value::Text("none".to_string())),
        (Value::Text("attStmt".to_string()), Value::Map(Vec::new())),
        (Value::Text("authData".to_string()), Value::Bytes(auth_data.to_vec())),
    ]);
    to_bytes(&object)
}

/// Extract the COSE public key from an attestation object
///
/// # Errors
///
/// Returns an error if the object is not CBOR, lacks `authData`, or carries no
/// attested credential data.
pub fn public_key_from_attestation(attestation_object: &[u8]) -> Result<Vec<u8>, CborError> {
    let attestation: Value =
        from_reader(attestation_object).map_err(|_| CborError::Malformed("invalid CBOR"))?;

    let Some(Some(auth_data)) = attestation.as_map().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.as_text() == Some("authData"))
            .map(|(_, v)| v.as_bytes())
    }) else {
        return Err(CborError::Malformed("missing authData"));
    };

    if auth_data.len() < 37 {
        return Err(CborError::Malformed("authData too short"));
    }
    if auth_data[32] & FLAG_ATTESTED_DATA == 0 {
        return Err(CborError::Malformed("no attested credential data"));
    }

    // Skip RP ID hash, flags, counter and AAGUID
    let mut pos = 37 + 16;
    if auth_data.len() < pos + 2 {
        return Err(CborError::Malformed("authData too short for credential id length"));
    }
    let id_len = usize::from(u16::from_be_bytes([auth_data[pos], auth_data[pos + 1]]));
    pos += 2 + id_len;

    if auth_data.len() <= pos {
        return Err(CborError::Malformed("authData too short for public key"));
    }
    Ok(auth_data[pos..].to_vec())
}

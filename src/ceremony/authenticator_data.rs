//! Attestation-object parsing.
//!
//! The verifier validates the attestation cryptographically; this module
//! only pulls two plain fields back out of the client's attestation object:
//! the AAGUID (to drive metadata resolution) and the registration-time
//! signature counter (the credential's starting counter value).

use crate::error::{AppError, AppResult};
use ciborium::value::Value;
use uuid::Uuid;

/// Fields extracted from the attested credential data of an attestation
/// object's authenticator data.
#[derive(Debug, Clone, Copy)]
pub struct AttestedCredentialData {
    pub aaguid: Uuid,
    pub sign_count: u32,
}

/// Parse a CBOR attestation object and extract AAGUID and signature counter.
///
/// Authenticator data layout:
/// - 32 bytes: RP ID hash
/// - 1 byte: flags (bit 6 = attested credential data present)
/// - 4 bytes: signature counter (big endian)
/// - 16 bytes: AAGUID (when the flag is set)
/// - 2 bytes + L bytes: credential id
/// - remainder: COSE public key
pub fn parse_attestation_object(bytes: &[u8]) -> AppResult<AttestedCredentialData> {
    let attestation: Value = ciborium::de::from_reader(bytes)
        .map_err(|_| AppError::MalformedRequest("Invalid CBOR attestation object".to_string()))?;

    let auth_data = attestation
        .as_map()
        .and_then(|map| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some("authData"))
                .and_then(|(_, v)| v.as_bytes())
        })
        .ok_or_else(|| {
            AppError::MalformedRequest("Missing authData in attestation object".to_string())
        })?;

    if auth_data.len() < 37 {
        return Err(AppError::MalformedRequest(
            "Authenticator data too short".to_string(),
        ));
    }

    let flags = auth_data[32];
    if flags & 0x40 == 0 {
        return Err(AppError::MalformedRequest(
            "No attested credential data in authenticator data".to_string(),
        ));
    }

    if auth_data.len() < 53 {
        return Err(AppError::MalformedRequest(
            "Authenticator data too short for attested credential data".to_string(),
        ));
    }

    let sign_count = u32::from_be_bytes([
        auth_data[33],
        auth_data[34],
        auth_data[35],
        auth_data[36],
    ]);

    let aaguid = Uuid::from_slice(&auth_data[37..53])
        .map_err(|_| AppError::MalformedRequest("Invalid AAGUID".to_string()))?;

    Ok(AttestedCredentialData { aaguid, sign_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_attestation_object(aaguid: Uuid, sign_count: u32, attested: bool) -> Vec<u8> {
        let mut auth_data = vec![0u8; 32]; // rp id hash
        auth_data.push(if attested { 0x45 } else { 0x05 }); // UP | UV | maybe AT
        auth_data.extend_from_slice(&sign_count.to_be_bytes());
        if attested {
            auth_data.extend_from_slice(aaguid.as_bytes());
            auth_data.extend_from_slice(&[0x00, 0x04]); // credential id length
            auth_data.extend_from_slice(&[1, 2, 3, 4]); // credential id
        }

        let object = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);

        let mut out = Vec::new();
        ciborium::ser::into_writer(&object, &mut out).expect("cbor encode");
        out
    }

    #[test]
    fn extracts_aaguid_and_counter() {
        let aaguid = Uuid::parse_str("2fc0579f-8113-47ea-b116-bb5a8db9202a").unwrap();
        let bytes = build_attestation_object(aaguid, 1337, true);

        let parsed = parse_attestation_object(&bytes).unwrap();
        assert_eq!(parsed.aaguid, aaguid);
        assert_eq!(parsed.sign_count, 1337);
    }

    #[test]
    fn rejects_missing_attested_credential_data() {
        let bytes = build_attestation_object(Uuid::nil(), 0, false);
        let err = parse_attestation_object(&bytes).unwrap_err();
        assert!(matches!(err, AppError::MalformedRequest(_)));
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_attestation_object(b"not cbor at all").unwrap_err();
        assert!(matches!(err, AppError::MalformedRequest(_)));
    }
}

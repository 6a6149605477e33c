//! # Payload Codec
//!
//! Log payloads are framed with a four byte marker so the inbound pipeline
//! can tell them apart from messages sent without the log.

use crate::domain::{DatasyncError, Payload};

/// Marker prefixed to every encoded payload.
pub const PAYLOAD_MAGIC: [u8; 4] = *b"MDDS";

/// Encode a payload for the wire.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, DatasyncError> {
    let body = bincode::serialize(payload).map_err(|e| DatasyncError::Encode(e.to_string()))?;
    let mut framed = Vec::with_capacity(PAYLOAD_MAGIC.len() + body.len());
    framed.extend_from_slice(&PAYLOAD_MAGIC);
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Decode a payload.
///
/// Returns `Ok(None)` for bytes without the marker: those were not produced
/// by a log and should be handled as a single plain message.
pub fn decode_payload(bytes: &[u8]) -> Result<Option<Payload>, DatasyncError> {
    let Some(body) = bytes.strip_prefix(&PAYLOAD_MAGIC[..]) else {
        return Ok(None);
    };
    bincode::deserialize(body)
        .map(Some)
        .map_err(|e| DatasyncError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogMessage;
    use shared_types::GroupId;

    #[test]
    fn test_encoded_payload_decodes() {
        let payload = Payload {
            acks: vec![[3; 32]],
            messages: vec![LogMessage {
                group_id: GroupId([1; 32]),
                timestamp: 42,
                body: b"body".to_vec(),
            }],
        };
        let bytes = encode_payload(&payload).unwrap();
        assert!(bytes.starts_with(&PAYLOAD_MAGIC));
        assert_eq!(decode_payload(&bytes).unwrap(), Some(payload));
    }

    #[test]
    fn test_unmarked_bytes_are_not_a_payload() {
        assert_eq!(decode_payload(b"plain wrapped message").unwrap(), None);
        assert_eq!(decode_payload(&[]).unwrap(), None);
    }

    #[test]
    fn test_marked_garbage_is_an_error() {
        let mut bytes = PAYLOAD_MAGIC.to_vec();
        bytes.extend_from_slice(&[0xFF; 3]);
        assert!(matches!(
            decode_payload(&bytes),
            Err(DatasyncError::Decode(_))
        ));
    }
}

//! Stream packet wire form.
//!
//! Fixed header: `timestamp` (f64, big-endian, 8 bytes), `sequence` (u64,
//! big-endian, 8 bytes), `metadata_len` (u32, big-endian, 4 bytes),
//! followed by `metadata_len` bytes of UTF-8 JSON, then the payload until
//! frame end. Used verbatim by the TCP and UDP adapters; WebSocket and
//! LSL-like adapters carry the same [`StreamPacket`] but serialize it
//! differently (see `router::protocol`).

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::OrchestratorError;

const HEADER_LEN: usize = 8 + 8 + 4;

/// One multicast unit flowing through a router: a monotonic per-router
/// sequence number, a producer-assigned timestamp, an opaque metadata map,
/// and opaque payload bytes. The core never interprets the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamPacket {
    pub sequence: u64,
    pub timestamp: f64,
    pub metadata: HashMap<String, String>,
    pub payload: Bytes,
}

impl StreamPacket {
    pub fn new(timestamp: f64, metadata: HashMap<String, String>, payload: Bytes) -> Self {
        Self {
            sequence: 0,
            timestamp,
            metadata,
            payload,
        }
    }

    /// Serialize to the fixed TCP/UDP wire form.
    pub fn encode(&self) -> Result<Bytes, OrchestratorError> {
        let metadata_json = serde_json::to_vec(&self.metadata).map_err(|e| {
            OrchestratorError::FrameDecodeError {
                stream: String::new(),
                reason: format!("failed to encode metadata: {e}"),
            }
        })?;

        let mut buf = BytesMut::with_capacity(HEADER_LEN + metadata_json.len() + self.payload.len());
        buf.put_f64(self.timestamp);
        buf.put_u64(self.sequence);
        buf.put_u32(metadata_json.len() as u32);
        buf.put_slice(&metadata_json);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parse a complete frame previously produced by [`StreamPacket::encode`].
    pub fn decode(mut frame: Bytes, stream: &str) -> Result<Self, OrchestratorError> {
        if frame.len() < HEADER_LEN {
            return Err(OrchestratorError::FrameDecodeError {
                stream: stream.to_string(),
                reason: format!(
                    "frame too short: {} bytes, need at least {HEADER_LEN}",
                    frame.len()
                ),
            });
        }

        let timestamp = frame.get_f64();
        let sequence = frame.get_u64();
        let metadata_len = frame.get_u32() as usize;

        if frame.len() < metadata_len {
            return Err(OrchestratorError::FrameDecodeError {
                stream: stream.to_string(),
                reason: format!(
                    "metadata length {metadata_len} exceeds remaining frame of {} bytes",
                    frame.len()
                ),
            });
        }

        let metadata_bytes = frame.split_to(metadata_len);
        let metadata: HashMap<String, String> = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| OrchestratorError::FrameDecodeError {
                stream: stream.to_string(),
                reason: format!("invalid metadata JSON: {e}"),
            })?;

        Ok(Self {
            sequence,
            timestamp,
            metadata,
            payload: frame,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let mut metadata = HashMap::new();
        metadata.insert("channels".to_string(), "8".to_string());
        let mut packet = StreamPacket::new(1234.5, metadata, Bytes::from_static(b"hello"));
        packet.sequence = 42;

        let encoded = packet.encode().unwrap();
        let decoded = StreamPacket::decode(encoded, "s1").unwrap();

        assert_eq!(decoded.sequence, 42);
        assert_eq!(decoded.timestamp, 1234.5);
        assert_eq!(decoded.metadata.get("channels"), Some(&"8".to_string()));
        assert_eq!(decoded.payload, Bytes::from_static(b"hello"));
    }

    #[test]
    fn decode_rejects_truncated_frame() {
        let err = StreamPacket::decode(Bytes::from_static(b"short"), "s1").unwrap_err();
        assert!(matches!(err, OrchestratorError::FrameDecodeError { .. }));
    }
}

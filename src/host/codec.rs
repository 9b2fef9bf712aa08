//! Native messaging framing
//!
//! Each message is UTF-8 JSON preceded by a 32-bit length in native byte
//! order. A frame that is not valid JSON is handed to the caller as an
//! error item so the stream keeps going.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Browsers refuse host messages larger than this
pub const MAX_OUTBOUND_BYTES: usize = 1024 * 1024;

/// Default limit for frames sent by the extension
pub const DEFAULT_MAX_INBOUND_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("port I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("outbound message of {size} bytes exceeds the {limit} byte limit")]
    OutboundTooLarge { size: usize, limit: usize },
}

pub struct NativeMessageCodec {
    frames: LengthDelimitedCodec,
    max_outbound: usize,
}

impl NativeMessageCodec {
    pub fn new(max_inbound: usize) -> Self {
        let frames = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .native_endian()
            .max_frame_length(max_inbound.max(MAX_OUTBOUND_BYTES))
            .new_codec();
        Self {
            frames,
            max_outbound: MAX_OUTBOUND_BYTES,
        }
    }
}

impl Default for NativeMessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INBOUND_BYTES)
    }
}

impl Decoder for NativeMessageCodec {
    type Item = Result<serde_json::Value, serde_json::Error>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.frames.decode(src)? {
            Some(frame) => Ok(Some(serde_json::from_slice(&frame))),
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for NativeMessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&item)?;
        if body.len() > self.max_outbound {
            return Err(CodecError::OutboundTooLarge {
                size: body.len(),
                limit: self.max_outbound,
            });
        }
        self.frames.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut bytes = (body.len() as u32).to_ne_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_decodes_across_partial_reads() {
        let mut codec = NativeMessageCodec::default();
        let bytes = frame(br#"{"kind":"capture"}"#);

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&bytes[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[3..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[10..]);
        let value = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(value, json!({"kind": "capture"}));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_json_does_not_poison_stream() {
        let mut codec = NativeMessageCodec::default();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame(b"{nope"));
        buf.extend_from_slice(&frame(b"[1]"));

        assert!(codec.decode(&mut buf).unwrap().unwrap().is_err());
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().unwrap(), json!([1]));
    }

    #[test]
    fn test_encode_writes_native_length_prefix() {
        let mut codec = NativeMessageCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(json!({"a": 1}), &mut buf).unwrap();

        let body = br#"{"a":1}"#;
        assert_eq!(&buf[..4], &(body.len() as u32).to_ne_bytes());
        assert_eq!(&buf[4..], body);
    }

    #[test]
    fn test_oversized_outbound_is_rejected() {
        let mut codec = NativeMessageCodec::default();
        let mut buf = BytesMut::new();
        let big = "x".repeat(MAX_OUTBOUND_BYTES + 1);

        let err = codec.encode(json!(big), &mut buf).unwrap_err();
        assert!(matches!(err, CodecError::OutboundTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_inbound_limit_is_enforced() {
        let mut codec = NativeMessageCodec::new(MAX_OUTBOUND_BYTES);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((MAX_OUTBOUND_BYTES + 1) as u32).to_ne_bytes());

        assert!(codec.decode(&mut buf).is_err());
    }
}

//! Length-prefixed MessagePack codec for tokio I/O.
//!
//! Framing: `[4 bytes: payload length, big-endian u32][N bytes: MessagePack payload]`

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::protocol::{MAX_PAYLOAD_SIZE, Message, RawEnvelope};

/// Codec error type.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload too large: {0} bytes (max {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Consume one length-prefixed frame from `src`, if complete.
///
/// `pending_len` carries the header across partial reads so the 4-byte
/// prefix is only consumed once.
fn take_frame(
    src: &mut BytesMut,
    pending_len: &mut Option<usize>,
) -> Result<Option<BytesMut>, CodecError> {
    let payload_len = match *pending_len {
        Some(len) => len,
        None => {
            if src.len() < 4 {
                return Ok(None); // Need more data for the header.
            }
            let len = src.get_u32() as usize;
            if len > MAX_PAYLOAD_SIZE {
                return Err(CodecError::PayloadTooLarge(len));
            }
            *pending_len = Some(len);
            len
        }
    };

    if src.len() < payload_len {
        // Reserve the remaining bytes up front to avoid repeated small
        // allocations while the frame trickles in.
        src.reserve(payload_len - src.len());
        return Ok(None);
    }

    let payload = src.split_to(payload_len);
    *pending_len = None;
    Ok(Some(payload))
}

fn put_frame(item: &Message, dst: &mut BytesMut) -> Result<(), CodecError> {
    let payload = rmp_serde::to_vec_named(item)?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    dst.reserve(4 + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.extend_from_slice(&payload);
    Ok(())
}

/// Length-prefixed MessagePack codec producing decoded [`Message`] values.
///
/// Used by client code (the overlay and the query client) for simple
/// send/receive. The daemon uses [`FrameCodec`] + [`decode_frame`] for
/// two-phase decode with unknown-type fallback.
#[derive(Debug, Default)]
pub struct MessageCodec {
    pending_len: Option<usize>,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self { pending_len: None }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match take_frame(src, &mut self.pending_len)? {
            Some(payload) => Ok(Some(rmp_serde::from_slice(&payload)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_frame(&item, dst)
    }
}

/// Frame-level codec — handles only the length prefix.
///
/// Returns raw `BytesMut` payloads without deserializing, so the daemon's
/// connection layer can try [`Message`] first and fall back to
/// [`RawEnvelope`] for unknown-type error responses.
#[derive(Debug, Default)]
pub struct FrameCodec {
    pending_len: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self { pending_len: None }
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        take_frame(src, &mut self.pending_len)
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        put_frame(&item, dst)
    }
}

/// Result of attempting to decode a raw frame into a protocol message.
#[derive(Debug)]
pub enum DecodeResult {
    /// Successfully decoded a known message variant.
    Ok(Message),
    /// Unknown type — extracted envelope for error response echoing.
    UnknownType(RawEnvelope),
    /// Completely malformed — could not even extract `{type, id}`.
    Malformed(rmp_serde::decode::Error),
}

/// Attempt two-phase decode of a raw frame.
///
/// 1. Try to deserialize as [`Message`] (known variant).
/// 2. On failure, try [`RawEnvelope`] to extract `{type, id}`.
/// 3. If both fail, return [`DecodeResult::Malformed`].
pub fn decode_frame(payload: &[u8]) -> DecodeResult {
    match rmp_serde::from_slice::<Message>(payload) {
        Ok(msg) => DecodeResult::Ok(msg),
        Err(_) => match rmp_serde::from_slice::<RawEnvelope>(payload) {
            Ok(envelope) => DecodeResult::UnknownType(envelope),
            Err(e) => DecodeResult::Malformed(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::protocol::{PROTOCOL_VERSION, Role, Status};
    use crate::store::{ClipEntry, EntryKind};

    fn encode_message(msg: &Message) -> BytesMut {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(msg.clone(), &mut buf).unwrap();
        buf
    }

    fn decode_message(buf: &mut BytesMut) -> Option<Message> {
        let mut codec = MessageCodec::new();
        codec.decode(buf).unwrap()
    }

    #[test]
    fn round_trip_through_codec() {
        let msg = Message::Hello {
            id: 0,
            version: PROTOCOL_VERSION,
            role: Role::Surface,
        };
        let mut buf = encode_message(&msg);
        assert_eq!(decode_message(&mut buf).unwrap(), msg);
    }

    #[test]
    fn round_trip_all_variants() {
        let messages = vec![
            Message::Hello {
                id: 0,
                version: 1,
                role: Role::Control,
            },
            Message::HelloAck {
                id: 0,
                status: Status::Ok,
                error: None,
            },
            Message::RequestRecent { id: 1, limit: 40 },
            Message::RequestSearch {
                id: 2,
                query: "needle".into(),
                limit: 20,
                kinds: Some(vec![EntryKind::Path]),
            },
            Message::HideAndClear { id: 3 },
            Message::ListUpdated {
                id: 0,
                seq: 12,
                entries: vec![ClipEntry {
                    id: 1,
                    content: "hello".into(),
                    timestamp: 1000,
                    kind: EntryKind::Text,
                }],
            },
            Message::Visibility {
                id: 0,
                visible: true,
            },
            Message::Response {
                id: 4,
                status: Status::Error,
                error: Some("unknown_type".into()),
            },
        ];

        for msg in &messages {
            let mut buf = encode_message(msg);
            let decoded = decode_message(&mut buf).unwrap();
            assert_eq!(&decoded, msg, "round-trip failed for {msg:?}");
        }
    }

    #[test]
    fn partial_header_returns_none() {
        let mut codec = MessageCodec::new();
        // Only 2 bytes of the 4-byte header.
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn partial_payload_returns_none() {
        let msg = Message::RequestRecent { id: 1, limit: 5 };
        let mut full = encode_message(&msg);

        // Take only the header + half the payload.
        let half = full.len() / 2;
        let mut partial = full.split_to(half);

        let mut codec = MessageCodec::new();
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Feed the rest.
        partial.extend_from_slice(&full);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn multiple_messages_in_buffer() {
        let msg1 = Message::RequestRecent { id: 1, limit: 5 };
        let msg2 = Message::HideAndClear { id: 2 };

        let mut buf = BytesMut::new();
        let mut codec = MessageCodec::new();
        codec.encode(msg1.clone(), &mut buf).unwrap();
        codec.encode(msg2.clone(), &mut buf).unwrap();

        let mut codec = MessageCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), msg1);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), msg2);
    }

    #[test]
    fn payload_too_large_on_decode() {
        let mut buf = BytesMut::new();
        // Length header claiming 17 MiB.
        buf.put_u32((17 * 1024 * 1024) as u32);
        buf.extend_from_slice(&[0u8; 100]);

        let mut codec = MessageCodec::new();
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::PayloadTooLarge(_)));
    }

    #[test]
    fn empty_buffer_returns_none() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn frame_length_header_is_big_endian() {
        let msg = Message::HideAndClear { id: 0 };
        let buf = encode_message(&msg);

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(buf.len() - 4, len);
    }

    #[test]
    fn frame_codec_yields_raw_payload() {
        let msg = Message::RequestRecent { id: 7, limit: 10 };
        let mut buf = encode_message(&msg);

        let mut codec = FrameCodec::new();
        let raw = codec.decode(&mut buf).unwrap().unwrap();
        match decode_frame(&raw) {
            DecodeResult::Ok(decoded) => assert_eq!(decoded, msg),
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn decode_frame_unknown_type() {
        #[derive(serde::Serialize)]
        struct FakeMsg {
            #[serde(rename = "type")]
            msg_type: &'static str,
            id: u32,
        }
        let payload = rmp_serde::to_vec_named(&FakeMsg {
            msg_type: "frobnicate",
            id: 9,
        })
        .unwrap();
        match decode_frame(&payload) {
            DecodeResult::UnknownType(envelope) => assert_eq!(envelope.id, 9),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn decode_frame_malformed() {
        match decode_frame(&[0xc1, 0xff, 0x00]) {
            DecodeResult::Malformed(_) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }
}

//! Binary envelope framing.
//!
//! ```text
//! +--------+---------+------+---------+-----------+----------------------+-------------+---------+
//! | "AMSH" | version | type | id (16) | n_meta u16| n × (klen u16 k,     | payload u32 | payload |
//! |        |   u8    |  u8  |         |           |      vlen u32 v)     |   length    |  bytes  |
//! +--------+---------+------+---------+-----------+----------------------+-------------+---------+
//! ```
//!
//! All integers are big-endian. A frame must be consumed exactly; trailing
//! bytes are an error.

use agentmesh_core::{MessageEnvelope, MessageType, SerializationError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const FRAME_MAGIC: &[u8; 4] = b"AMSH";
pub const FRAME_VERSION: u8 = 1;
/// Largest payload accepted by the decoder (16 MiB).
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;
const MAX_METADATA_ENTRIES: usize = u16::MAX as usize;

fn frame_err(reason: impl Into<String>) -> SerializationError {
    SerializationError::Frame {
        reason: reason.into(),
    }
}

/// Encode an envelope into one frame.
pub fn encode_frame(envelope: &MessageEnvelope) -> Result<Bytes, SerializationError> {
    if envelope.payload.len() > MAX_PAYLOAD_LEN {
        return Err(frame_err(format!(
            "payload of {} bytes exceeds limit of {}",
            envelope.payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }
    if envelope.metadata.len() > MAX_METADATA_ENTRIES {
        return Err(frame_err("too many metadata entries"));
    }

    let meta_len: usize = envelope
        .metadata
        .iter()
        .map(|(k, v)| 2 + k.len() + 4 + v.len())
        .sum();
    let mut buf = BytesMut::with_capacity(4 + 1 + 1 + 16 + 2 + meta_len + 4 + envelope.payload.len());

    buf.put_slice(FRAME_MAGIC);
    buf.put_u8(FRAME_VERSION);
    buf.put_u8(envelope.message_type.to_u8());
    buf.put_slice(envelope.id.as_bytes());
    buf.put_u16(envelope.metadata.len() as u16);
    for (key, value) in &envelope.metadata {
        let key_len = u16::try_from(key.len())
            .map_err(|_| frame_err(format!("metadata key too long: {} bytes", key.len())))?;
        let value_len = u32::try_from(value.len())
            .map_err(|_| frame_err(format!("metadata value too long for key {}", key)))?;
        buf.put_u16(key_len);
        buf.put_slice(key.as_bytes());
        buf.put_u32(value_len);
        buf.put_slice(value.as_bytes());
    }
    buf.put_u32(envelope.payload.len() as u32);
    buf.put_slice(&envelope.payload);

    Ok(buf.freeze())
}

fn need(buf: &impl Buf, n: usize, what: &str) -> Result<(), SerializationError> {
    if buf.remaining() < n {
        return Err(frame_err(format!(
            "truncated frame: need {} bytes for {}, have {}",
            n,
            what,
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_string(buf: &mut &[u8], len: usize, what: &str) -> Result<String, SerializationError> {
    need(&*buf, len, what)?;
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| frame_err(format!("{} is not valid UTF-8", what)))
}

/// Decode exactly one frame.
pub fn decode_frame(frame: &[u8]) -> Result<MessageEnvelope, SerializationError> {
    let mut buf = frame;

    need(&buf, 4 + 1 + 1 + 16 + 2, "header")?;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if &magic != FRAME_MAGIC {
        return Err(frame_err("bad magic"));
    }
    let version = buf.get_u8();
    if version != FRAME_VERSION {
        return Err(frame_err(format!("unsupported frame version {}", version)));
    }
    let type_code = buf.get_u8();
    let message_type = MessageType::from_u8(type_code)
        .ok_or_else(|| frame_err(format!("unknown message type code {}", type_code)))?;
    let mut id = [0u8; 16];
    buf.copy_to_slice(&mut id);

    let entries = buf.get_u16() as usize;
    let mut metadata = BTreeMap::new();
    for _ in 0..entries {
        need(&buf, 2, "metadata key length")?;
        let key_len = buf.get_u16() as usize;
        let key = read_string(&mut buf, key_len, "metadata key")?;
        need(&buf, 4, "metadata value length")?;
        let value_len = buf.get_u32() as usize;
        let value = read_string(&mut buf, value_len, "metadata value")?;
        metadata.insert(key, value);
    }

    need(&buf, 4, "payload length")?;
    let payload_len = buf.get_u32() as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(frame_err(format!(
            "payload of {} bytes exceeds limit of {}",
            payload_len, MAX_PAYLOAD_LEN
        )));
    }
    need(&buf, payload_len, "payload")?;
    let payload = buf.copy_to_bytes(payload_len).to_vec();

    if buf.has_remaining() {
        return Err(frame_err(format!("{} trailing bytes", buf.remaining())));
    }

    Ok(MessageEnvelope {
        id: Uuid::from_bytes(id),
        message_type,
        payload,
        metadata,
    })
}

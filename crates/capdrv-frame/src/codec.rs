use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kv::{KeyedObject, KvMap, KEY_SIZE, KV_HEADER_SIZE};

/// Frame header: signature (4) + checksum (4) + sequence (4) + type tag (16)
/// + frame size (4) + keyed-object count (4) = 36 bytes.
pub const FRAME_HEADER_SIZE: usize = 36;

/// Signature word carried by every frame, big-endian on the wire.
pub const FRAME_SIGNATURE: u32 = 0xDECA_FBAD;

/// Type tags are ASCII, NUL-padded to 16 bytes.
pub const TYPE_TAG_SIZE: usize = 16;

/// Default maximum total frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A parsed control frame: type tag, command sequence, and the keyed
/// objects carried in the payload, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// ASCII type tag, at most 16 characters. Matched case-insensitively.
    pub type_tag: String,
    /// Command sequence number echoed by success records.
    pub sequence: u32,
    /// Keyed objects in insertion order.
    pub objects: Vec<KeyedObject>,
}

impl Frame {
    pub fn new(type_tag: impl Into<String>, sequence: u32) -> Self {
        Self {
            type_tag: type_tag.into(),
            sequence,
            objects: Vec::new(),
        }
    }

    /// Append a keyed object, preserving insertion order.
    pub fn push(&mut self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        self.objects.push(KeyedObject::new(key, bytes));
    }

    /// Case-insensitive lookup table over the keyed objects.
    pub fn kv_map(&self) -> KvMap {
        KvMap::from_objects(&self.objects)
    }

    /// The total wire size of this frame (header + keyed objects).
    pub fn wire_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.objects.iter().map(KeyedObject::wire_size).sum::<usize>()
    }
}

/// Adler-32 over a complete frame image. The checksum field must already
/// be zero in `bytes`.
pub fn frame_checksum(bytes: &[u8]) -> u32 {
    let mut adler = adler::Adler32::new();
    adler.write_slice(bytes);
    adler.checksum()
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌───────────┬──────────┬──────────┬────────────┬────────────┬────────┬─────────┐
/// │ Signature │ Checksum │ Sequence │ Type tag   │ Frame size │ Num kv │ Payload │
/// │ (4B)      │ (4B)     │ (4B)     │ (16B, NUL) │ (4B)       │ (4B)   │ …       │
/// └───────────┴──────────┴──────────┴────────────┴────────────┴────────┴─────────┘
/// ```
/// The checksum is Adler-32 over the complete frame with the checksum
/// field zeroed; it is patched in place after the payload is written.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut, max_frame_size: usize) -> Result<()> {
    validate_name(&frame.type_tag, TYPE_TAG_SIZE, "type tag")?;
    for obj in &frame.objects {
        validate_name(&obj.key, KEY_SIZE, "key")?;
    }

    let frame_size = frame.wire_size();
    if frame_size > max_frame_size || frame_size > u32::MAX as usize {
        return Err(FrameError::BadFrame(format!(
            "frame too large ({frame_size} bytes, max {max_frame_size})"
        )));
    }

    let start = dst.len();
    dst.reserve(frame_size);

    dst.put_u32(FRAME_SIGNATURE);
    dst.put_u32(0); // checksum patched below
    dst.put_u32(frame.sequence);
    put_padded(dst, &frame.type_tag, TYPE_TAG_SIZE);
    dst.put_u32(frame_size as u32);
    dst.put_u32(frame.objects.len() as u32);

    for obj in &frame.objects {
        put_padded(dst, &obj.key, KEY_SIZE);
        dst.put_u32(obj.bytes.len() as u32);
        dst.put_slice(&obj.bytes);
    }

    let checksum = frame_checksum(&dst[start..]);
    dst[start + 4..start + 8].copy_from_slice(&checksum.to_be_bytes());

    Ok(())
}

/// Decode one frame from the front of `buf` without consuming it.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame; the
/// caller consumes nothing and retries once more bytes arrive. On success
/// returns the frame together with its wire size, which the caller must
/// consume atomically. Signature, checksum, and structural failures are
/// fatal for the stream.
pub fn decode_frame(buf: &[u8], max_frame_size: usize) -> Result<Option<(Frame, usize)>> {
    if buf.len() < FRAME_HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let signature = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if signature != FRAME_SIGNATURE {
        return Err(FrameError::BadSignature);
    }

    let frame_size = u32::from_be_bytes(buf[28..32].try_into().unwrap()) as usize;
    if frame_size < FRAME_HEADER_SIZE {
        return Err(FrameError::BadFrame(format!(
            "frame size {frame_size} smaller than header"
        )));
    }
    if frame_size > max_frame_size {
        return Err(FrameError::BadFrame(format!(
            "frame too large ({frame_size} bytes, max {max_frame_size})"
        )));
    }
    if frame_size > buf.len() {
        return Ok(None); // Need more data
    }

    let stored = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    let mut image = buf[..frame_size].to_vec();
    image[4..8].fill(0);
    let computed = frame_checksum(&image);
    if computed != stored {
        return Err(FrameError::BadChecksum { stored, computed });
    }

    let sequence = u32::from_be_bytes(buf[8..12].try_into().unwrap());
    let type_tag = padded_name(&buf[12..28], "type tag")?;
    let num_kv = u32::from_be_bytes(buf[32..36].try_into().unwrap()) as usize;

    let payload = &buf[FRAME_HEADER_SIZE..frame_size];
    let mut objects = Vec::with_capacity(num_kv.min(64));
    let mut offset = 0usize;

    for _ in 0..num_kv {
        if payload.len() - offset < KV_HEADER_SIZE {
            return Err(FrameError::BadFrame(
                "keyed object header runs past end of payload".to_string(),
            ));
        }
        let key = padded_name(&payload[offset..offset + KEY_SIZE], "key")?;
        let obj_size = u32::from_be_bytes(
            payload[offset + KEY_SIZE..offset + KV_HEADER_SIZE]
                .try_into()
                .unwrap(),
        ) as usize;

        let start = offset + KV_HEADER_SIZE;
        if obj_size > payload.len() - start {
            return Err(FrameError::BadFrame(format!(
                "keyed object '{key}' runs past end of payload"
            )));
        }

        objects.push(KeyedObject::new(
            key,
            Bytes::copy_from_slice(&payload[start..start + obj_size]),
        ));
        offset = start + obj_size;
    }

    Ok(Some((
        Frame {
            type_tag,
            sequence,
            objects,
        },
        frame_size,
    )))
}

fn validate_name(name: &str, max: usize, what: &str) -> Result<()> {
    if name.is_empty() || name.len() > max || !name.is_ascii() {
        return Err(FrameError::BadFrame(format!(
            "{what} '{name}' must be 1..={max} ASCII bytes"
        )));
    }
    Ok(())
}

fn put_padded(dst: &mut BytesMut, name: &str, width: usize) {
    dst.put_slice(name.as_bytes());
    dst.put_bytes(0, width - name.len());
}

fn padded_name(raw: &[u8], what: &str) -> Result<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let name = &raw[..end];
    if !name.is_ascii() {
        return Err(FrameError::BadFrame(format!("{what} is not ASCII")));
    }
    // ASCII is valid UTF-8
    Ok(String::from_utf8_lossy(name).into_owned())
}

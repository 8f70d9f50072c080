//! Wire codec for the capture control protocol.
//!
//! Every control frame is signed, checksummed, and length-prefixed:
//! - A 4-byte signature word (0xDECAFBAD) for stream validation
//! - An Adler-32 checksum computed with the checksum field zeroed
//! - A 4-byte command sequence and a 16-byte NUL-padded type tag
//! - A keyed-object payload: 16-byte keys with length-prefixed contents
//!
//! Decoding is stream-oriented: partial input yields need-more without
//! consuming anything, and a frame leaves the stream whole or not at all.

pub mod codec;
pub mod error;
pub mod kv;
pub mod proto;
pub mod records;
pub mod value;

pub use codec::{
    decode_frame, encode_frame, frame_checksum, Frame, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE,
    FRAME_SIGNATURE, TYPE_TAG_SIZE,
};
pub use error::{FrameError, Result};
pub use kv::{KeyedObject, KvMap, KEY_SIZE, KV_HEADER_SIZE};
pub use records::{
    ChannelsRecord, GpsRecord, HopRecord, InterfaceEntry, InterfaceListRecord, MessageRecord,
    PacketRecord, SignalRecord, SuccessRecord,
};
pub use value::{Value, ValueError, MAX_VALUE_DEPTH};

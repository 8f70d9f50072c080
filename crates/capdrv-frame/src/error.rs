/// Errors that can occur while encoding or decoding control frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header carries the wrong signature word.
    #[error("invalid frame signature (expected {:#010x})", crate::codec::FRAME_SIGNATURE)]
    BadSignature,

    /// The stored checksum does not match the Adler-32 of the frame.
    #[error("invalid checksum (stored {stored:#010x}, computed {computed:#010x})")]
    BadChecksum { stored: u32, computed: u32 },

    /// The frame is structurally invalid: bad sizes, overlong tags or keys,
    /// keyed objects running past the payload, or an oversized frame.
    #[error("malformed frame: {0}")]
    BadFrame(String),

    /// A keyed object's content failed to decode.
    #[error("failed to unpack {key} object: {reason}")]
    BadKeyedObject { key: String, reason: String },
}

impl FrameError {
    pub(crate) fn keyed(key: &str, reason: impl ToString) -> Self {
        FrameError::BadKeyedObject {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

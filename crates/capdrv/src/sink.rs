use bytes::Bytes;
use capdrv_frame::{GpsRecord, SignalRecord};

/// Message severity flags carried by remote MESSAGE objects and forwarded
/// to the host message bus.
pub const MSG_DEBUG: u32 = 1;
pub const MSG_INFO: u32 = 2;
pub const MSG_ERROR: u32 = 4;
pub const MSG_ALERT: u32 = 8;
pub const MSG_FATAL: u32 = 16;

/// A captured frame handed to the host's packet chain: timestamp, link
/// type, the raw undecoded bytes, and whatever radio/geo metadata the
/// source attached.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub ts_sec: u64,
    pub ts_usec: u64,
    pub dlt: u64,
    pub data: Bytes,
    pub signal: Option<SignalRecord>,
    pub gps: Option<GpsRecord>,
}

/// Receives captured frames. The sink owns each frame after handoff.
pub trait PacketSink: Send + Sync {
    fn deliver(&self, frame: CapturedFrame);
}

/// Receives human-readable messages from the remote and from the driver's
/// own supervision, with `MSG_*` severity flags.
pub trait MessageSink: Send + Sync {
    fn message(&self, msg: &str, flags: u32);
}

/// Packet sink that counts frames into the log and drops them.
#[derive(Debug, Default)]
pub struct LogPacketSink;

impl PacketSink for LogPacketSink {
    fn deliver(&self, frame: CapturedFrame) {
        tracing::debug!(dlt = frame.dlt, size = frame.data.len(), "dropping captured frame");
    }
}

/// Message sink that forwards to the tracing stack.
#[derive(Debug, Default)]
pub struct LogMessageSink;

impl MessageSink for LogMessageSink {
    fn message(&self, msg: &str, flags: u32) {
        if flags & (MSG_ERROR | MSG_ALERT | MSG_FATAL) != 0 {
            tracing::error!(flags, "{msg}");
        } else if flags & MSG_DEBUG != 0 {
            tracing::debug!(flags, "{msg}");
        } else {
            tracing::info!(flags, "{msg}");
        }
    }
}

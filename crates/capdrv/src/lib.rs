//! Control-plane driver for remote capture sources.
//!
//! A [`CaptureSource`] is the host-side endpoint of one capture session:
//! it speaks the framed, checksummed keyed-object protocol to a remote
//! capture process over any [`ControlTransport`], tracks in-flight
//! commands by wire sequence, applies channel/UUID/interface updates to
//! its observable [`SourceState`], hands captured frames to the host's
//! [`PacketSink`], and supervises errors with optional automatic re-open.
//!
//! ## Threading
//!
//! One internal mutex guards the driver. Public operations never block on
//! I/O; completion callbacks run after internal locks are released on the
//! thread that observed the response, so callbacks may call back into the
//! driver. A callback must not block on another thread that itself needs
//! the driver.
//!
//! ```no_run
//! use std::sync::Arc;
//! use capdrv::{CaptureSource, SourcePrototype};
//!
//! let prototype = SourcePrototype::new("linuxwifi")
//!     .probe_capable(true)
//!     .local_capable(true)
//!     .tune_capable(true);
//! let source = CaptureSource::new(prototype);
//! // source.connect_transport(...) with the host's transport, then:
//! source.open_interface(
//!     "wlan0:name=radio0,retry=true",
//!     1,
//!     Some(Box::new(|tx, ok, msg| {
//!         println!("open #{tx}: ok={ok} msg={msg}");
//!     })),
//! );
//! ```

pub mod config;
pub mod definition;
mod dispatch;
pub mod sink;
pub mod source;
pub mod state;
pub mod timer;
pub mod tracker;

pub use capdrv_frame::{GpsRecord, SignalRecord};
pub use capdrv_transport::{ControlTransport, TransportEvents};
pub use config::DriverConfig;
pub use definition::{DefinitionError, SourceDefinition};
pub use sink::{
    CapturedFrame, LogMessageSink, LogPacketSink, MessageSink, PacketSink, MSG_ALERT, MSG_DEBUG,
    MSG_ERROR, MSG_FATAL, MSG_INFO,
};
pub use source::CaptureSource;
pub use state::{ListedInterface, SourcePrototype, SourceState};
pub use timer::{ThreadTimers, TimerId, TimerService};
pub use tracker::{AckCallback, CommandKind, CommandTracker, Completion, ListCallback, PendingCommand};

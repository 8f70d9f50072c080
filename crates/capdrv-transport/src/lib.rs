//! Transport abstraction between the capture driver and its remote.
//!
//! The driver never owns sockets or pipes; it consumes a byte-buffer pair
//! through [`ControlTransport`] and receives read-side notifications
//! through [`TransportEvents`]. Concrete transports (subprocess pipes,
//! network streams) live with the host; an in-memory [`loopback`] pair is
//! provided for tests and simulation.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{Result, TransportError};
pub use loopback::{loopback, LoopbackRemote, LoopbackTransport};
pub use traits::{ControlTransport, TransportEvents};

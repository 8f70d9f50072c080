//! In-memory transport pair for tests and simulated hosts.
//!
//! [`loopback`] returns the driver half and a [`LoopbackRemote`] handle
//! standing in for the capture process: the remote injects inbound bytes
//! and drains whatever the driver wrote. Delivery is not automatic; the
//! test pumps the driver's `bytes_available` itself, which keeps partial
//! and split reads fully scriptable.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Buf, BytesMut};

use crate::error::{Result, TransportError};
use crate::traits::ControlTransport;

#[derive(Debug, Default)]
struct Shared {
    inbound: BytesMut,
    outbound: BytesMut,
    closed: Option<String>,
}

/// Driver half of an in-memory transport pair.
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Mutex<Shared>>,
}

/// Remote half: the test's stand-in for the capture process.
#[derive(Debug, Clone)]
pub struct LoopbackRemote {
    shared: Arc<Mutex<Shared>>,
}

/// Create a connected transport/remote pair.
pub fn loopback() -> (LoopbackTransport, LoopbackRemote) {
    let shared = Arc::new(Mutex::new(Shared::default()));
    (
        LoopbackTransport {
            shared: Arc::clone(&shared),
        },
        LoopbackRemote { shared },
    )
}

impl ControlTransport for LoopbackTransport {
    fn peek(&mut self, buf: &mut [u8]) -> Result<usize> {
        let shared = lock(&self.shared);
        if let Some(reason) = &shared.closed {
            return Err(TransportError::Closed(reason.clone()));
        }
        let n = buf.len().min(shared.inbound.len());
        buf[..n].copy_from_slice(&shared.inbound[..n]);
        Ok(n)
    }

    fn available(&self) -> usize {
        lock(&self.shared).inbound.len()
    }

    fn consume(&mut self, n: usize) -> Result<()> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = &shared.closed {
            return Err(TransportError::Closed(reason.clone()));
        }
        if n > shared.inbound.len() {
            return Err(TransportError::Io(std::io::Error::other(format!(
                "consume of {n} bytes exceeds {} buffered",
                shared.inbound.len()
            ))));
        }
        shared.inbound.advance(n);
        Ok(())
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let mut shared = lock(&self.shared);
        if let Some(reason) = &shared.closed {
            return Err(TransportError::Closed(reason.clone()));
        }
        shared.outbound.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        let mut shared = lock(&self.shared);
        if shared.closed.is_none() {
            shared.closed = Some(reason.to_string());
        }
    }
}

impl LoopbackRemote {
    /// Queue bytes for the driver to read. Returns the total now buffered,
    /// which the test passes to the driver's `bytes_available`.
    pub fn inject(&self, bytes: &[u8]) -> usize {
        let mut shared = lock(&self.shared);
        shared.inbound.extend_from_slice(bytes);
        shared.inbound.len()
    }

    /// Drain everything the driver has written.
    pub fn drain_sent(&self) -> Vec<u8> {
        let mut shared = lock(&self.shared);
        let bytes = shared.outbound.split();
        bytes.to_vec()
    }

    /// Bytes the driver has written and the remote has not drained.
    pub fn sent_len(&self) -> usize {
        lock(&self.shared).outbound.len()
    }

    /// Bytes injected but not yet consumed by the driver.
    pub fn pending_len(&self) -> usize {
        lock(&self.shared).inbound.len()
    }

    /// The close reason, once the driver shut the transport down.
    pub fn close_reason(&self) -> Option<String> {
        lock(&self.shared).closed.clone()
    }
}

fn lock(shared: &Mutex<Shared>) -> std::sync::MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_consume() {
        let (mut transport, remote) = loopback();
        remote.inject(b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(transport.peek(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(transport.available(), 6);

        transport.consume(2).unwrap();
        assert_eq!(transport.peek(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"cdef");
    }

    #[test]
    fn put_is_visible_to_remote() {
        let (mut transport, remote) = loopback();
        transport.put(b"frame").unwrap();
        assert_eq!(remote.drain_sent(), b"frame");
        assert_eq!(remote.sent_len(), 0);
    }

    #[test]
    fn consume_past_buffer_is_an_error() {
        let (mut transport, remote) = loopback();
        remote.inject(b"ab");
        assert!(transport.consume(3).is_err());
    }

    #[test]
    fn close_latches_first_reason() {
        let (mut transport, remote) = loopback();
        transport.close("going away");
        transport.close("second reason");
        assert_eq!(remote.close_reason().as_deref(), Some("going away"));

        let mut buf = [0u8; 1];
        assert!(matches!(
            transport.peek(&mut buf),
            Err(TransportError::Closed(_))
        ));
        assert!(matches!(
            transport.put(b"x"),
            Err(TransportError::Closed(_))
        ));
    }
}

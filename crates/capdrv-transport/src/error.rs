/// Errors that can occur on the control transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport has been closed and cannot move bytes.
    #[error("transport closed: {0}")]
    Closed(String),

    /// An I/O error occurred on the underlying byte stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The write buffer could not absorb a complete frame.
    #[error("short write ({written} of {requested} bytes)")]
    ShortWrite { written: usize, requested: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;

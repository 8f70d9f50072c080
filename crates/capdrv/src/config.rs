use std::time::Duration;

use capdrv_frame::DEFAULT_MAX_FRAME_SIZE;

/// Tunables for a driver instance.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum total frame size accepted or produced. Default: 16 MiB.
    pub max_frame_size: usize,
    /// When set, every command is armed with a one-shot timeout that fails
    /// that command alone; the session stays up. Default: no timeout.
    pub command_timeout: Option<Duration>,
    /// Delay before a retry-enabled source re-opens after an error.
    pub retry_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            command_timeout: None,
            retry_delay: Duration::from_secs(5),
        }
    }
}

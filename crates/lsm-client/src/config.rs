//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the plugin socket directory.
pub const SOCKET_DIR_ENV: &str = "LSM_UDS_PATH";

/// Directory holding one socket per plugin when nothing overrides it.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/lsm/ipc";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory containing the plugin sockets, one per plugin name.
    pub socket_dir: PathBuf,

    /// Delay between two `job_status` polls.
    pub poll_interval: Duration,

    /// Maximum time to wait for a job. `None` waits until it finishes.
    pub job_timeout: Option<Duration>,

    /// Bound on each request/response round trip and on connecting.
    pub io_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            poll_interval: Duration::from_millis(250),
            job_timeout: None,
            io_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Creates a configuration that looks for plugin sockets in `socket_dir`.
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            ..Default::default()
        }
    }

    /// Builder: set the job poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder: set the job wait deadline.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Builder: set the per-request IO timeout.
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    /// Returns the socket path for a plugin.
    pub fn plugin_socket(&self, plugin: &str) -> PathBuf {
        self.socket_dir.join(plugin)
    }
}

/// Returns the plugin socket directory.
///
/// Uses `$LSM_UDS_PATH` when set and non-empty, otherwise
/// `/var/run/lsm/ipc`.
pub fn default_socket_dir() -> PathBuf {
    match std::env::var(SOCKET_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_SOCKET_DIR),
    }
}

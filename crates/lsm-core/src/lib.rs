//! Shared runtime concerns for the storage management IPC crates.
//!
//! Both the initiator (`lsm-client`) and the responder (`lsm-plugin`) re-export
//! this crate's tracing setup so that management tools and plugin executables
//! configure logging the same way.

pub mod tracing;

pub use tracing::{FRAME_TARGET, LogFormat, LogOutput, TracingConfig, TracingError, init_tracing};

/// Crate targets that the default env filter enables.
pub const LOG_TARGETS: &[&str] = &["lsm_core", "lsm_protocol", "lsm_client", "lsm_plugin"];

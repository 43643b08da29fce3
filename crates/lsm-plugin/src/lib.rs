//! Responder side of the storage plugin IPC protocol.
//!
//! A plugin builds a [`DispatchTable`] once at startup, binding a handler for
//! each method it implements. Every accepted connection then gets its own
//! [`Router`], which reads requests, runs handlers and writes back exactly
//! one response per request. Methods left unbound are answered with a
//! "not supported" error.
//!
//! ```ignore
//! use std::sync::Arc;
//! use lsm_plugin::{DispatchTable, JobTracker, PluginConfig, serve};
//! use serde_json::Value;
//! use tokio::net::UnixListener;
//!
//! let jobs = Arc::new(JobTracker::new());
//! let table = DispatchTable::builder()
//!     .bind("plugin_register", |_: Value| async move { Ok(()) })
//!     .bind("plugin_unregister", |_: Value| async move { Ok(()) })
//!     .jobs(Arc::clone(&jobs))
//!     .build()?;
//!
//! let listener = UnixListener::bind("/var/run/lsm/ipc/sim")?;
//! let shutdown = async {
//!     let _ = tokio::signal::ctrl_c().await;
//! };
//! serve(listener, Arc::new(table), Arc::new(PluginConfig::default()), shutdown).await?;
//! ```

pub mod config;
pub mod error;
mod jobs;
mod router;
mod table;

pub use config::PluginConfig;
pub use error::{PluginError, PluginResult};
pub use jobs::JobTracker;
pub use lsm_core::{TracingConfig, init_tracing};
pub use router::{Router, serve};
pub use table::{
    DispatchTable, DispatchTableBuilder, Handler, HandlerFuture, INFO_METHOD, METHODS,
    TEARDOWN_METHOD,
};

//! Initiator side of the storage plugin IPC protocol.
//!
//! A [`Client`] owns one connection to a plugin. It sends requests one at a
//! time, decodes responses, and manages asynchronous jobs: polling them,
//! freeing them once complete, and surfacing failures.
//!
//! ```ignore
//! use lsm_client::{Client, ClientConfig};
//! use serde_json::Value;
//!
//! let mut client = Client::open("sim://", None, 30_000, ClientConfig::default()).await?;
//! let pools: Vec<Value> = client.pools(&[]).await?;
//! client.close().await?;
//! ```

mod client;
pub mod config;
pub mod error;
mod jobs;
mod operations;

pub use client::{Client, PluginInfo, plugin_name};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use jobs::JobOutcome;
pub use lsm_core::{TracingConfig, init_tracing};

//! IPC framing, envelopes and payload types for storage plugins.
//!
//! This crate defines the wire protocol spoken between a storage management
//! client and a plugin process over a local stream socket.
//!
//! # Protocol Overview
//!
//! Messages are sent as length-prefixed JSON:
//! - 10 bytes: payload length as zero-padded ASCII decimal
//! - N bytes: JSON payload
//!
//! # Envelope Structure
//!
//! A [`Request`] carries `method`, a constant `id` and an object of
//! `params`. A [`Response`] echoes the `id` and carries either a `result` or
//! a structured [`ErrorResponse`].
//!
//! # Example
//!
//! ```rust
//! use lsm_protocol::{decode_frame, encode_frame, Request};
//! use serde_json::Map;
//!
//! let request = Request::new("systems", Map::new());
//! let bytes = encode_frame(&serde_json::to_vec(&request).unwrap()).unwrap();
//! let decoded: Request = serde_json::from_slice(decode_frame(&bytes).unwrap()).unwrap();
//! assert_eq!(decoded.method, "systems");
//! ```

mod capabilities;
mod error;
mod framing;
mod job;
mod transport;
mod types;

pub use capabilities::{Capabilities, CapabilityType};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{MAX_FRAME_SIZE, decode_frame, encode_frame, parse_header, read_frame, write_frame};
pub use job::{JobId, JobOrResult, JobState, JobStatus};
pub use transport::Transport;
pub use types::{ErrorCode, ErrorResponse, Request, Response};

/// Width of the ASCII length header.
pub const HEADER_LEN: usize = 10;

/// Correlation id carried by every request and response.
pub const REQUEST_ID: i64 = 100;

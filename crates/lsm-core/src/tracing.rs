//! Logging setup shared by management clients and plugin processes.
//!
//! ```ignore
//! use lsm_core::{TracingConfig, init_tracing};
//!
//! // Plugin executable: JSON lines on stderr with dispatch spans.
//! init_tracing(TracingConfig::plugin())?;
//!
//! // Client debugging session with every frame dumped.
//! init_tracing(TracingConfig::default().with_frame_dump(true))?;
//! ```
//!
//! `RUST_LOG` wins over the configured level whenever it is set.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, format::FmtSpan, writer::BoxMakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;

use crate::LOG_TARGETS;

/// Target that logs every frame written or read, at trace level.
pub const FRAME_TARGET: &str = "lsm_protocol::framing";

/// Errors that can occur while installing the subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    #[default]
    Stderr,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the IPC crates when no filter is given.
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log source file and line.
    pub source_location: bool,
    /// Log span open and close, which carries dispatch timings.
    pub span_events: bool,
    /// Log every frame payload.
    pub frame_dump: bool,
    /// Explicit filter directive, replacing both `level` and `RUST_LOG`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            output: LogOutput::Stderr,
            source_location: false,
            span_events: false,
            frame_dump: false,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Settings for a plugin process started by the daemon.
    #[must_use]
    pub fn plugin() -> Self {
        Self {
            format: LogFormat::Json,
            source_location: true,
            span_events: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Turns the per-frame payload log on or off.
    #[must_use]
    pub fn with_frame_dump(mut self, enabled: bool) -> Self {
        self.frame_dump = enabled;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Directive used when neither `filter` nor `RUST_LOG` is set.
    pub fn directive(&self) -> String {
        let mut directives: Vec<String> = LOG_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.level))
            .collect();
        if self.frame_dump {
            directives.push(format!("{}=trace", FRAME_TARGET));
        }
        directives.join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        if let Some(filter) = &self.filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive())))
    }
}

/// Installs the global subscriber. Call once, early in `main`.
///
/// # Errors
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;

    let writer = match config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(span_events);
    let layer = match config.format {
        LogFormat::Text => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;
    Ok(())
}

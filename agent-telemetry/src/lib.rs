//! Observability utilities for agents.
//!
//! Installs a `tracing-subscriber` pipeline writing to stderr, either as
//! human-readable lines or as JSON objects. Standard output stays free for
//! command results.

#![warn(missing_docs, clippy::pedantic)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt};

/// Filter applied when neither the configuration nor `RUST_LOG` names one.
pub const DEFAULT_FILTER: &str = "info";

/// Output encoding of log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One human-readable line per record.
    #[default]
    Plain,
    /// One JSON object per record.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::UnknownFormat {
                format: other.to_owned(),
            }),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives; `RUST_LOG` applies when unset.
    pub filter: Option<String>,
    /// Output encoding.
    pub format: LogFormat,
}

impl TelemetryConfig {
    fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        match &self.filter {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TelemetryError::InvalidFilter {
                    reason: err.to_string(),
                })
            }
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
        }
    }
}

/// Failures while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Filter directives did not parse.
    #[error("invalid log filter: {reason}")]
    InvalidFilter {
        /// Parser message.
        reason: String,
    },

    /// Unrecognised log format name.
    #[error("unknown log format `{format}` (expected `plain` or `json`)")]
    UnknownFormat {
        /// The rejected value.
        format: String,
    },

    /// A global subscriber is already installed.
    #[error("tracing subscriber already initialised: {reason}")]
    AlreadyInitialized {
        /// Message from `tracing-subscriber`.
        reason: String,
    },
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for bad directives and
/// [`TelemetryError::AlreadyInitialized`] when called a second time.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);

    let installed = match config.format {
        LogFormat::Plain => registry
            .with(
                subscriber_fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                subscriber_fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.map_err(|err| TelemetryError::AlreadyInitialized {
        reason: err.to_string(),
    })?;

    tracing::debug!(format = %config.format, "logging initialised");
    Ok(())
}

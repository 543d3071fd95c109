//! Typed errors for the seams where callers react differently per failure. Everything else is
//! plumbed through [anyhow].

use std::path::PathBuf;

use thiserror::Error;

/// Invalid configuration. Only ever raised at startup, it stops the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid time of day {0:?}, expected HH:MM")]
    InvalidTime(String),

    #[error("{name} must be within [0, 1], got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("invalid pane identifier {0:?}, expected session:window.pane")]
    InvalidPane(String),

    #[error("can't determine {0}, neither the XDG variable nor HOME is set")]
    MissingDirectory(&'static str),
}

/// Failure of the external summarization call. Every variant is retried on a later tick.
#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication rejected by provider ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider quota exhausted: {0}")]
    Quota(String),

    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("no API key configured for {0}")]
    MissingApiKey(String),
}

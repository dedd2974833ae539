//! Error types for the survey bot.

use std::time::Duration;

/// Configuration-related errors. These are the only errors allowed to abort
/// startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse {path}: {reason}")]
    ParseError { path: String, reason: String },

    #[error("Step definitions are missing required step '{step}'")]
    MissingStep { step: String },

    #[error("Step definitions reference unknown step '{step}'")]
    UnknownStep { step: String },

    #[error("Default backend '{name}' is not registered (known: {known})")]
    UnknownDefaultBackend { name: String, known: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("No channel named {name} is registered")]
    UnknownChannel { name: String },

    #[error("Channel health check failed: {name}")]
    HealthCheckFailed { name: String },
}

/// Failures of a single `generate` call.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Backend {backend} request failed: {reason}")]
    RequestFailed { backend: String, reason: String },

    #[error("Invalid response from {backend}: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("Backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("Backend {backend} does not generate text")]
    Disabled { backend: String },
}

impl LlmError {
    /// Disabled generation is not a failure the user should hear about.
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }
}

/// Failures of a backend swap. The previously active backend stays in effect.
#[derive(Debug, thiserror::Error)]
pub enum BackendLoadError {
    #[error("Unknown backend '{name}'")]
    UnknownBackend { name: String },

    #[error("Failed to load backend {name}: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("Loading backend {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

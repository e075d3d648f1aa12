//! Error types for mailwatch
//!
//! Startup errors (`ConfigError`, `WatchSetupError`) are fatal and stop the
//! process before any directory becomes active. Per-message failures are
//! carried as `ProcessorFailure` inside a `ProcessResult` and never stop the
//! event loop.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unknown processor class '{class}' for processor '{name}'")]
    UnknownClass { class: String, name: String },

    #[error("invalid options for processor '{name}': {message}")]
    InvalidOptions { name: String, message: String },

    #[error("missing required option '{key}' for processor '{name}'")]
    MissingOption { name: String, key: String },

    #[error("directory not specified")]
    NoDirectories,

    #[error("directories configured but no processor is enabled")]
    NoEnabledProcessors,
}

/// A configured directory could not be registered with the watcher.
#[derive(Debug, Error)]
pub enum WatchSetupError {
    #[error("directory not found: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("directory unreadable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create file system watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Anything that keeps the watcher from reaching the active state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Watch(#[from] WatchSetupError),

    #[error("failed to spawn event loop thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Delivery endpoint unreachable or rejected the message
    Transport,
    /// Local filesystem error
    Io,
    /// Message lacks what the processor needs (sender, recipients, ...)
    InvalidMessage,
    /// Processor panicked while handling the message
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Transport => "transport",
            FailureKind::Io => "io",
            FailureKind::InvalidMessage => "invalid message",
            FailureKind::Panicked => "panicked",
        };
        f.write_str(label)
    }
}

/// Cause of a `ProcessResult::Failed`, detailed enough to log without
/// knowing the processor's internals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {detail}")]
pub struct ProcessorFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ProcessorFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Build a failure from an error, flattening its source chain into the detail.
    pub fn from_error(kind: FailureKind, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut detail = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { kind, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_flattens_source_chain() {
        let err = ConfigError::Read {
            path: PathBuf::from("mailwatch.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let failure = ProcessorFailure::from_error(FailureKind::Io, &err);

        assert_eq!(failure.kind, FailureKind::Io);
        assert!(failure.detail.starts_with("failed to read config file mailwatch.json"));
        assert!(failure.detail.ends_with(": no such file"));
        assert!(failure.to_string().starts_with("io error: "));
    }

    #[test]
    fn test_startup_error_exit_code_is_nonzero() {
        let err = StartupError::from(ConfigError::NoDirectories);
        assert_ne!(err.exit_code(), 0);
        assert_eq!(err.to_string(), "directory not specified");
    }
}

use camino::Utf8PathBuf;
use std::io;
use thiserror::Error;

/// Errors raised while syncing the plugin table with disk
#[derive(Error, Debug)]
pub enum PersistorError {
    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid plugin table JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl PersistorError {
    pub(crate) fn read(path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action: "read",
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action: "write",
            path: path.into(),
            source,
        }
    }

    /// A missing file means "nothing to load yet", not a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Sink for failures that must reach the user but never abort the caller.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str, error: &PersistorError);
}

/// Default sink: logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, message: &str, error: &PersistorError) {
        tracing::error!("{}: {}", message, error);
    }
}

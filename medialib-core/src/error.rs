use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Startup and lifecycle failures of a [`crate::MediaDb`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("won't create database: {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("database not found at {0}")]
    NotFound(PathBuf),

    #[error("database {0} is locked by another process")]
    Locked(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backends did not finish creating within {0:?}")]
    CreationTimeout(Duration),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reasons the dispatcher refused a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("rescan already in process")]
    RescanPending,

    #[error("no backend named {0}")]
    UnknownBackend(String),

    #[error("context {context} has no parameter {name}")]
    UnknownParameter { context: String, name: String },
}

/// Failures of the control bus itself.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("sink is full")]
    Full,

    #[error("sink is disconnected")]
    Disconnected,

    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

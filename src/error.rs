//! Error types for the object store, codec and command bus.

use std::io;

use thiserror::Error;

/// Failure turning encoded text back into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed record text: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("record text is not an object")]
    NotAnObject,

    #[error("unknown kind: {0}")]
    UnknownKind(String),

    #[error("nested record carries no kind tag")]
    Untagged,

    #[error("kind tag is not a string")]
    BadTag,

    #[error("field '{field}': {reason}")]
    Field { field: String, reason: String },
}

/// Failure of a store operation. Never retried by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record at {path}")]
    NotFound { path: String },

    #[error("cannot decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("not a store path: {0}")]
    BadPath(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound { path }
        } else {
            StoreError::Io { path, source }
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus is shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

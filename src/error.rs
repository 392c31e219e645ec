use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Mapping load error: {0}")]
    MappingLoad(#[from] MappingLoadError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("File handle '{0}' is already persisted for another file")]
    HandleConflict(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Busy/locked SQLite failures are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::Config(config::ConfigError::Message(message.into()))
    }
}

/// Failure reading or parsing the keyword-mapping source.
#[derive(Error, Debug)]
pub enum MappingLoadError {
    #[error("cannot read mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV mapping file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed JSON mapping file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid mapping record {record} in {path}: {reason}")]
    InvalidRecord {
        path: PathBuf,
        record: usize,
        reason: String,
    },
}

/// Failure reading image dimensions for a single file.
#[derive(Error, Debug)]
pub enum ImageDecodeError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

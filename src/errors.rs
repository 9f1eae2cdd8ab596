// src/errors.rs
use std::fmt;
use thiserror::Error;

/// Which of the two stores a persistence failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Canonical,
    Mirror,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Canonical => "canonical",
            StoreKind::Mirror => "mirror",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("NETWORK: {url}: {message}")]
    Network { url: String, message: String },
    #[error("PERSISTENCE({store}): {message}")]
    Persistence { store: StoreKind, message: String },
    #[error("SCHEMA_MIGRATION: {0}")]
    SchemaMigration(String),
    #[error("CONFIG: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn network(url: &str, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn canonical(message: impl Into<String>) -> Self {
        Self::Persistence {
            store: StoreKind::Canonical,
            message: message.into(),
        }
    }

    pub fn mirror(message: impl Into<String>) -> Self {
        Self::Persistence {
            store: StoreKind::Mirror,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for WorkerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::canonical(value.to_string())
    }
}

impl From<mongodb::error::Error> for WorkerError {
    fn from(value: mongodb::error::Error) -> Self {
        Self::mirror(value.to_string())
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(value: std::io::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;

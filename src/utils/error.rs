use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid document path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Commit time not returned for {0}")]
    MissingCommitTime(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("User doc {uid} created without {field}")]
    MissingRequiredField { uid: String, field: &'static str },

    #[error("Invalid user id '{uid}': {source}")]
    InvalidUid {
        uid: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to commit bootstrap batch: {0}")]
    StoreCommit(#[source] StoreError),
}

impl BootstrapError {
    /// Whether redelivering the same event can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BootstrapError::StoreCommit(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

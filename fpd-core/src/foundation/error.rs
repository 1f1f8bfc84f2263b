use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotMonotone,
    AlreadyExists,
    NotFound,
    KeyNotFound,
    Slashed,
    DuplicateVoteSameHash,
    DuplicateVoteDiffHash,
    AlreadyCommitted,
    UnknownProvider,
    NotActive,
    RandomnessExhausted,
    Transient,
    Permanent,
    Cancelled,
    InvalidStateTransition,
    StorageError,
    SerializationError,
    CryptoError,
    EncodingError,
    ConfigError,
    RpcError,
    Message,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("height cursor {field} would regress: current={current} attempted={attempted}")]
    NotMonotone { field: &'static str, current: u64, attempted: u64 },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("finality provider is slashed: {0}")]
    Slashed(String),

    #[error("duplicate finality vote at height {height} over the same block hash")]
    DuplicateVoteSameHash { height: u64 },

    #[error("duplicate finality vote at height {height} over a conflicting block hash")]
    DuplicateVoteDiffHash { height: u64 },

    #[error("public randomness already committed at start height {start_height}")]
    AlreadyCommitted { start_height: u64 },

    #[error("unknown finality provider: {0}")]
    UnknownProvider(String),

    #[error("finality provider has no voting power: {0}")]
    NotActive(String),

    #[error("no committed randomness covering height {height}")]
    RandomnessExhausted { height: u64 },

    #[error("transient error during {operation}: {details}")]
    Transient { operation: String, details: String },

    #[error("permanent error ({code}): {details}")]
    Permanent { code: String, details: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid status transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("rpc error: {0}")]
    RpcError(String),

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

impl ProviderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::NotMonotone { .. } => ErrorCode::NotMonotone,
            ProviderError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            ProviderError::NotFound(_) => ErrorCode::NotFound,
            ProviderError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            ProviderError::Slashed(_) => ErrorCode::Slashed,
            ProviderError::DuplicateVoteSameHash { .. } => ErrorCode::DuplicateVoteSameHash,
            ProviderError::DuplicateVoteDiffHash { .. } => ErrorCode::DuplicateVoteDiffHash,
            ProviderError::AlreadyCommitted { .. } => ErrorCode::AlreadyCommitted,
            ProviderError::UnknownProvider(_) => ErrorCode::UnknownProvider,
            ProviderError::NotActive(_) => ErrorCode::NotActive,
            ProviderError::RandomnessExhausted { .. } => ErrorCode::RandomnessExhausted,
            ProviderError::Transient { .. } => ErrorCode::Transient,
            ProviderError::Permanent { .. } => ErrorCode::Permanent,
            ProviderError::Cancelled => ErrorCode::Cancelled,
            ProviderError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            ProviderError::StorageError { .. } => ErrorCode::StorageError,
            ProviderError::SerializationError { .. } => ErrorCode::SerializationError,
            ProviderError::CryptoError { .. } => ErrorCode::CryptoError,
            ProviderError::EncodingError(_) => ErrorCode::EncodingError,
            ProviderError::ConfigError(_) => ErrorCode::ConfigError,
            ProviderError::RpcError(_) => ErrorCode::RpcError,
            ProviderError::Message(_) => ErrorCode::Message,
        }
    }

    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }

    pub fn transient(operation: impl Into<String>, details: impl Into<String>) -> Self {
        ProviderError::Transient { operation: operation.into(), details: details.into() }
    }

    pub fn permanent(code: impl Into<String>, details: impl Into<String>) -> Self {
        ProviderError::Permanent { code: code.into(), details: details.into() }
    }

    pub fn storage(operation: impl Into<String>, details: impl Into<String>) -> Self {
        ProviderError::StorageError { operation: operation.into(), details: details.into() }
    }

    pub fn crypto(operation: impl Into<String>, details: impl Into<String>) -> Self {
        ProviderError::CryptoError { operation: operation.into(), details: details.into() }
    }
}

impl From<hex::FromHexError> for ProviderError {
    fn from(err: hex::FromHexError) -> Self {
        ProviderError::EncodingError(format!("hex decode error: {}", err))
    }
}

impl From<toml::de::Error> for ProviderError {
    fn from(err: toml::de::Error) -> Self {
        ProviderError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<rocksdb::Error> for ProviderError {
    fn from(err: rocksdb::Error) -> Self {
        ProviderError::StorageError { operation: "rocksdb".to_string(), details: err.to_string() }
    }
}

impl From<bincode::Error> for ProviderError {
    fn from(err: bincode::Error) -> Self {
        ProviderError::SerializationError { format: "bincode".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<io::Error> for ProviderError {
    fn from(err: io::Error) -> Self {
        ProviderError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_variants() {
        let err = ProviderError::NotMonotone { field: "last_voted_height", current: 5, attempted: 4 };
        assert_eq!(err.code(), ErrorCode::NotMonotone);
        assert!(err.to_string().contains("last_voted_height"));

        let err = ProviderError::DuplicateVoteDiffHash { height: 7 };
        assert_eq!(err.code(), ErrorCode::DuplicateVoteDiffHash);
        assert!(err.to_string().contains("conflicting"));
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ProviderError::transient("query_block", "timeout").is_transient());
        assert!(!ProviderError::permanent("malformed", "bad payload").is_transient());
        assert!(!ProviderError::Cancelled.is_transient());
    }
}

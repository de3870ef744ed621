//! Error types for the Redis storage backend.
//!
//! [`RedisStorageError`] wraps client errors and configuration problems and
//! converts into the generic [`StorageError`] the rest of the service sees.

use redis::{ErrorKind, RedisError};
use thiserror::Error;
use uniqname_storage::StorageError;

/// Result type alias for Redis storage operations.
pub type Result<T> = std::result::Result<T, RedisStorageError>;

/// Errors specific to the Redis storage backend.
#[derive(Debug, Error)]
pub enum RedisStorageError {
    /// Error reported by the Redis client.
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The initial connection did not complete in time.
    #[error("Timed out connecting after {0:?}")]
    ConnectTimeout(std::time::Duration),
}

impl From<RedisStorageError> for StorageError {
    fn from(err: RedisStorageError) -> Self {
        match err {
            RedisStorageError::Redis(source) => redis_error_to_storage_error(source),
            RedisStorageError::Config(message) => StorageError::internal(format!("Config: {message}")),
            RedisStorageError::ConnectTimeout(after) => {
                tracing::warn!(?after, "Redis connect timed out");
                StorageError::timeout()
            },
        }
    }
}

/// Maps a client error onto the canonical [`StorageError`] variants.
fn redis_error_to_storage_error(err: RedisError) -> StorageError {
    if err.is_timeout() {
        tracing::warn!(error = %err, "Redis operation timed out");
        return StorageError::timeout();
    }

    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        return StorageError::connection_with_source("Redis connection failed", err);
    }

    match err.kind() {
        ErrorKind::ClusterDown | ErrorKind::TryAgain | ErrorKind::MasterDown => {
            StorageError::connection_with_source("Redis unavailable", err)
        },
        ErrorKind::TypeError => StorageError::serialization_with_source("Unexpected Redis reply", err),
        ErrorKind::AuthenticationFailed => {
            StorageError::internal_with_source("Redis authentication failed", err)
        },
        _ => StorageError::internal_with_source("Redis command failed", err),
    }
}

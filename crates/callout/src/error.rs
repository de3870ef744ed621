//! Error types for the callout service.
//!
//! Per-request failures ([`CalloutError`], [`ReaperError`]) are contained to
//! the message that caused them: the subscription loop logs them and moves
//! on. Only [`ServiceError`] ends the process: at startup, or when a
//! subscription is lost while running.

use thiserror::Error;
use uniqname_authn::AuthError;
use uniqname_storage::StorageError;

use crate::config::ConfigError;

/// Why an authorization request produced no reply.
#[derive(Debug, Error)]
pub enum CalloutError {
    /// The request failed envelope decoding or validation.
    #[error("Rejected authorization request: {0}")]
    Protocol(#[source] AuthError),

    /// The reservation store failed.
    #[error("Reservation store error: {0}")]
    Storage(#[from] StorageError),

    /// The user token or the response could not be signed.
    #[error("Failed to sign response: {0}")]
    Signing(#[source] AuthError),

    /// The signed response could not be sent back to the server.
    #[error("Failed to publish response: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<AuthError> for CalloutError {
    fn from(err: AuthError) -> Self {
        if err.is_protocol_error() { Self::Protocol(err) } else { Self::Signing(err) }
    }
}

impl CalloutError {
    /// Returns `true` for malformed or foreign requests, as opposed to local
    /// infrastructure failures.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Why a disconnect event did not release a reservation cleanly.
#[derive(Debug, Error)]
pub enum ReaperError {
    /// The payload is not a disconnect event.
    #[error("Failed to decode disconnect event: {0}")]
    Decode(#[from] serde_json::Error),

    /// The reservation store failed.
    #[error("Reservation store error: {0}")]
    Storage(#[from] StorageError),

    /// The name is held by another connection; the event is stale or duplicated.
    #[error("Reservation {key} is held by connection {stored}, not {disconnected}")]
    OwnerMismatch {
        /// Reservation key.
        key: String,
        /// Connection id in the store.
        stored: u64,
        /// Connection id in the event.
        disconnected: u64,
    },
}

/// Fatal service failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The signing seed is unusable.
    #[error("Invalid signing seed: {0}")]
    Seed(#[source] AuthError),

    /// The reservation store could not be set up.
    #[error("Failed to connect to reservation store: {0}")]
    StoreConnect(#[source] StorageError),

    /// The liveness check against the store failed outright.
    #[error("Reservation store health check failed: {0}")]
    StoreHealthCheck(#[source] StorageError),

    /// The liveness check ran but reported the store unhealthy.
    #[error("Reservation store is unhealthy: {0}")]
    StoreUnhealthy(String),

    /// The message bus could not be reached.
    #[error("Failed to connect to NATS: {0}")]
    BusConnect(#[from] async_nats::ConnectError),

    /// A subscription could not be registered.
    #[error("Failed to subscribe to {subject}: {source}")]
    Subscribe {
        /// Subject of the failed subscription.
        subject: String,
        /// Underlying client error.
        #[source]
        source: async_nats::SubscribeError,
    },

    /// A subscription ended while the service was running.
    #[error("Subscription to {subject} closed unexpectedly")]
    SubscriptionClosed {
        /// Subject of the lost subscription.
        subject: String,
    },

    /// The service task ended abnormally.
    #[error("Service task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_auth_error_classification() {
        let protocol: CalloutError = AuthError::InvalidSignature.into();
        assert!(protocol.is_protocol_error());

        let signing: CalloutError = AuthError::Signing("key unavailable".into()).into();
        assert!(!signing.is_protocol_error());
        assert!(matches!(signing, CalloutError::Signing(_)));
    }

    #[test]
    fn test_storage_error_is_infrastructure() {
        let err: CalloutError = StorageError::timeout().into();
        assert!(!err.is_protocol_error());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_owner_mismatch_display() {
        let err = ReaperError::OwnerMismatch { key: "UNIQUER/eA==".into(), stored: 11, disconnected: 10 };
        assert_eq!(err.to_string(), "Reservation UNIQUER/eA== is held by connection 11, not 10");
    }

    #[test]
    fn test_decode_error_keeps_source() {
        let err: ReaperError = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err().into();
        assert!(err.to_string().starts_with("Failed to decode disconnect event"));
        assert!(err.source().is_some());
    }
}

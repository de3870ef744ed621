//! Authentication error types.
//!
//! This module defines errors that can occur while decoding, verifying and
//! signing NATS claims.

use thiserror::Error;

/// Authentication and signing errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed JWT that cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Issuer is not the expected kind of key or does not match.
    #[error("Invalid issuer: {0}")]
    InvalidIssuer(String),

    /// Audience doesn't match expected value.
    #[error("Invalid audience: {0}")]
    InvalidAudience(String),

    /// Required claim is missing.
    #[error("Missing claim: {0}")]
    MissingClaim(String),

    /// Algorithm or token type in the header is not accepted.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Claim `type` does not match the claim kind being decoded.
    #[error("Unexpected claim type: expected '{expected}', got '{actual}'")]
    UnexpectedClaimType {
        /// Claim type the caller asked for.
        expected: &'static str,
        /// Claim type found in the token.
        actual: String,
    },

    /// The signing seed could not be parsed or is not an account seed.
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    /// The signer failed to produce a signature.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Claims could not be serialized.
    #[error("Claims serialization failed")]
    Serialization(#[source] serde_json::Error),
}

impl AuthError {
    /// Creates an [`AuthError::InvalidTokenFormat`].
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates an [`AuthError::InvalidIssuer`].
    pub fn invalid_issuer(message: impl Into<String>) -> Self {
        Self::InvalidIssuer(message.into())
    }

    /// Creates an [`AuthError::InvalidAudience`].
    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::InvalidAudience(message.into())
    }

    /// Creates an [`AuthError::MissingClaim`].
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim(claim.into())
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`].
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Returns `true` if the error describes a bad or foreign request rather
    /// than a local signing or serialization fault.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, Self::InvalidSeed(_) | Self::Signing(_) | Self::Serialization(_))
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Serialization(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

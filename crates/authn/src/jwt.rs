//! NATS JWT encoding and decoding.
//!
//! A token is three unpadded base64url segments joined by dots:
//!
//! ```text
//! base64url({"typ":"JWT","alg":"ed25519-nkey"}) "." base64url(claims) "." base64url(signature)
//! ```
//!
//! The signature is Ed25519 by the issuer's nkey over the first two
//! segments, so a token can be verified with nothing but its own `iss`.
//!
//! # Example
//!
//! ```no_run
//! use uniqname_authn::{
//!     claims::AuthorizationRequest,
//!     jwt::decode_claims,
//!     validation::validate_authorization_request,
//! };
//!
//! # fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let request = decode_claims::<AuthorizationRequest>(token)?;
//! validate_authorization_request(&request)?;
//! println!("client {} wants in", request.nats.client_info.name);
//! # Ok(())
//! # }
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use data_encoding::BASE32_NOPAD;
use nkeys::KeyPair;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha512_256};

use crate::{
    claims::{Claims, ClaimsData, NatsClaim},
    error::AuthError,
    signer::Signer,
    validation::{ACCEPTED_ALGORITHMS, TOKEN_TYPE, validate_header},
};

const ED25519_SIGNATURE_LEN: usize = 64;

/// JWT header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Token type, `JWT`.
    #[serde(default)]
    pub typ: String,
    /// Signing algorithm, `ed25519-nkey`.
    #[serde(default)]
    pub alg: String,
}

impl Default for Header {
    fn default() -> Self {
        Self { typ: TOKEN_TYPE.to_owned(), alg: ACCEPTED_ALGORITHMS[0].to_owned() }
    }
}

/// Splits a token into its three segments.
fn split_token(token: &str) -> Result<[&str; 3], AuthError> {
    let mut parts = token.trim().split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(claims), Some(signature), None) => Ok([header, claims, signature]),
        _ => Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots")),
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT {what}: {e}"))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT {what}: {e}")))
}

/// Decode a JWT header without verification.
///
/// # Errors
///
/// Returns an error if the token is not three segments or the header cannot
/// be decoded.
pub fn decode_header(token: &str) -> Result<Header, AuthError> {
    let [header, _, _] = split_token(token)?;
    decode_segment(header, "header")
}

/// Decode and verify a token carrying claims of kind `T`.
///
/// The header must pass [`validate_header`], `nats.type` must equal
/// `T::CLAIM_TYPE`, and the signature must verify against the public nkey
/// in `iss`. No envelope checks beyond that are made here; callers apply
/// their own (see [`validate_authorization_request`]).
///
/// [`validate_authorization_request`]: crate::validation::validate_authorization_request
///
/// # Errors
///
/// - [`AuthError::InvalidTokenFormat`] for structural problems
/// - [`AuthError::UnsupportedAlgorithm`] for a rejected header
/// - [`AuthError::MissingClaim`] when `iss` is empty
/// - [`AuthError::UnexpectedClaimType`] for a different claim kind
/// - [`AuthError::InvalidIssuer`] when `iss` is not a public nkey
/// - [`AuthError::InvalidSignature`] when verification fails
pub fn decode_claims<T: NatsClaim>(token: &str) -> Result<Claims<T>, AuthError> {
    let token = token.trim();
    let [header_segment, claims_segment, signature_segment] = split_token(token)?;

    let header: Header = decode_segment(header_segment, "header")?;
    validate_header(&header)?;

    let claims: Claims<T> = decode_segment(claims_segment, "claims")?;
    if claims.data.iss.is_empty() {
        return Err(AuthError::missing_claim("iss"));
    }
    if claims.nats.claim_type() != T::CLAIM_TYPE {
        return Err(AuthError::UnexpectedClaimType {
            expected: T::CLAIM_TYPE,
            actual: claims.nats.claim_type().to_owned(),
        });
    }

    let signature = URL_SAFE_NO_PAD.decode(signature_segment).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT signature: {e}"))
    })?;

    let issuer = KeyPair::from_public_key(&claims.data.iss)
        .map_err(|e| AuthError::invalid_issuer(format!("{:?}: {e}", claims.data.iss)))?;
    if signature.len() != ED25519_SIGNATURE_LEN {
        return Err(AuthError::InvalidSignature);
    }

    // Signed input is the header and claims segments exactly as received.
    let signed_len = header_segment.len() + 1 + claims_segment.len();
    issuer.verify(&token.as_bytes()[..signed_len], &signature).map_err(|e| {
        tracing::warn!(iss = %claims.data.iss, error = %e, "Token signature verification failed");
        AuthError::InvalidSignature
    })?;

    tracing::debug!(iss = %claims.data.iss, sub = %claims.data.sub, "Token signature verified");
    Ok(claims)
}

/// Computes the `jti` of an envelope: the unpadded base32 SHA-512/256 of
/// the registered fields serialized with an empty `jti`.
pub fn claims_hash(data: &ClaimsData) -> Result<String, AuthError> {
    let unhashed = ClaimsData { jti: String::new(), ..data.clone() };
    let json = serde_json::to_vec(&unhashed)?;
    Ok(BASE32_NOPAD.encode(&Sha512_256::digest(&json)))
}

/// Sign `claims` with `signer`, producing a compact token.
///
/// Fills in `iss` (the signer's public key), `iat` (now) and `jti` before
/// signing; any values already present in those fields are replaced.
///
/// # Errors
///
/// Returns [`AuthError::Serialization`] if the claims cannot be serialized
/// and [`AuthError::Signing`] if the signer fails.
pub fn encode_claims<T: NatsClaim>(
    mut claims: Claims<T>,
    signer: &Signer,
) -> Result<String, AuthError> {
    claims.data.iss = signer.public_key().to_owned();
    claims.data.iat = Utc::now().timestamp();
    claims.data.jti = claims_hash(&claims.data)?;

    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&Header::default())?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{header}.{payload}");

    let signature = signer.sign(signing_input.as_bytes())?;

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

//! Header and envelope validation.
//!
//! Two layers of checks run on every inbound authorization request:
//!
//! 1. [`validate_header`] before the signature is trusted: the token must be a `JWT` signed with
//!    `ed25519-nkey`. Symmetric algorithms and `none` are always rejected.
//! 2. [`validate_authorization_request`] after the signature verified: the request must be
//!    self-consistent about which server issued it and addressed to the callout audience.

use crate::{
    claims::{AUTHORIZATION_REQUEST_AUDIENCE, AuthorizationRequest, Claims},
    error::AuthError,
    jwt::Header,
};

/// Token type every header must declare.
pub const TOKEN_TYPE: &str = "JWT";

/// Forbidden JWT algorithms that are never accepted.
///
/// - `none`: No signature verification (trivially bypassable)
/// - `HS256`, `HS384`, `HS512`: Symmetric algorithms (shared secret vulnerability)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
///
/// NATS v2 claims are signed with an Ed25519 nkey and declare
/// `ed25519-nkey`. The v1 `ed25519` form signs a different input and is not
/// accepted.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["ed25519-nkey"];

/// Prefix of a server public nkey.
const SERVER_KEY_PREFIX: char = 'N';

/// Validate a JWT algorithm against security policies.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if:
/// - Algorithm is symmetric (HS256, HS384, HS512)
/// - Algorithm is "none"
/// - Algorithm is not in [`ACCEPTED_ALGORITHMS`]
///
/// # Examples
///
/// ```
/// use uniqname_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("ed25519-nkey").is_ok());
/// assert!(validate_algorithm("EdDSA").is_err());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list (only ed25519-nkey is supported)"
        )));
    }

    Ok(())
}

/// Validate a decoded JWT header.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the type is not `JWT`
/// (compared case-insensitively) and [`AuthError::UnsupportedAlgorithm`] if
/// the algorithm is rejected by [`validate_algorithm`].
pub fn validate_header(header: &Header) -> Result<(), AuthError> {
    if !header.typ.eq_ignore_ascii_case(TOKEN_TYPE) {
        return Err(AuthError::invalid_token_format(format!(
            "unexpected token type '{}'",
            header.typ
        )));
    }
    validate_algorithm(&header.alg)
}

/// Validate the envelope of a signature-verified authorization request.
///
/// Checks, in order:
/// 1. The issuer is a server nkey (starts with `N`).
/// 2. The issuer equals the `server_id.id` embedded in the request.
/// 3. The audience is `nats-authorization-request`.
///
/// # Errors
///
/// [`AuthError::InvalidIssuer`] for the first two checks and
/// [`AuthError::InvalidAudience`] for the third.
pub fn validate_authorization_request(
    claims: &Claims<AuthorizationRequest>,
) -> Result<(), AuthError> {
    let issuer = &claims.data.iss;

    if !issuer.starts_with(SERVER_KEY_PREFIX) {
        return Err(AuthError::invalid_issuer(format!("expected server: {issuer:?}")));
    }

    let server_id = &claims.nats.server_id.id;
    if issuer != server_id {
        return Err(AuthError::invalid_issuer(format!(
            "issuers don't match: {issuer:?} != {server_id:?}"
        )));
    }

    if claims.data.aud != AUTHORIZATION_REQUEST_AUDIENCE {
        return Err(AuthError::invalid_audience(format!(
            "unexpected audience: {:?}",
            claims.data.aud
        )));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::claims::ServerId;

    fn request(iss: &str, server_id: &str, aud: &str) -> Claims<AuthorizationRequest> {
        let server = ServerId { id: server_id.into(), ..ServerId::default() };
        let mut claims = Claims::new("UUSER", aud, AuthorizationRequest::new(server, "UUSER"));
        claims.data.iss = iss.into();
        claims
    }

    #[test]
    fn test_validate_algorithm_nkey_accepted() {
        assert!(validate_algorithm("ed25519-nkey").is_ok());
    }

    #[test]
    fn test_validate_algorithm_v1_rejected() {
        let result = validate_algorithm("ed25519");
        assert!(
            matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not in accepted list"))
        );
    }

    #[test]
    fn test_forbidden_algorithms_each_rejected_with_security_message() {
        for alg in FORBIDDEN_ALGORITHMS {
            let result = validate_algorithm(alg);
            assert!(
                matches!(result, Err(AuthError::UnsupportedAlgorithm(ref msg)) if msg.contains("not allowed for security reasons")),
                "Expected security rejection for forbidden algorithm '{alg}'"
            );
        }
    }

    #[test]
    fn test_validate_header_type_is_case_insensitive() {
        let header = Header { typ: "jwt".into(), alg: "ed25519-nkey".into() };
        assert!(validate_header(&header).is_ok());
    }

    #[test]
    fn test_validate_header_rejects_other_types() {
        let header = Header { typ: "JWS".into(), alg: "ed25519-nkey".into() };
        assert!(matches!(validate_header(&header), Err(AuthError::InvalidTokenFormat(_))));
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate_authorization_request(&request("NABC", "NABC", AUTHORIZATION_REQUEST_AUDIENCE)).is_ok());
    }

    #[test]
    fn test_non_server_issuer_rejected() {
        let result = validate_authorization_request(&request("AABC", "AABC", AUTHORIZATION_REQUEST_AUDIENCE));
        assert!(matches!(result, Err(AuthError::InvalidIssuer(ref msg)) if msg.contains("expected server")));
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let result = validate_authorization_request(&request("NABC", "NXYZ", AUTHORIZATION_REQUEST_AUDIENCE));
        assert!(matches!(result, Err(AuthError::InvalidIssuer(ref msg)) if msg.contains("don't match")));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let result = validate_authorization_request(&request("NABC", "NABC", "APP"));
        assert!(matches!(result, Err(AuthError::InvalidAudience(_))));
    }

    #[test]
    fn test_issuer_checked_before_audience() {
        let result = validate_authorization_request(&request("UABC", "NABC", "APP"));
        assert!(matches!(result, Err(AuthError::InvalidIssuer(_))));
    }
}

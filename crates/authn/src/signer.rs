//! Signing capability derived from the callout's account seed.

use std::fmt;

use nkeys::KeyPair;

use crate::{
    claims::{AuthorizationResponse, Claims, User},
    error::AuthError,
    jwt::encode_claims,
};

/// Prefix of an account public nkey.
const ACCOUNT_KEY_PREFIX: char = 'A';

/// Signs user tokens and authorization responses.
///
/// Built once at startup from the account seed configured as the callout
/// issuer, then shared read-only by every handler task.
pub struct Signer {
    key: KeyPair,
    public_key: String,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("public_key", &self.public_key).finish_non_exhaustive()
    }
}

impl Signer {
    /// Derives a signer from an account seed (`SA...`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSeed`] if the seed does not parse or is
    /// not an account seed.
    pub fn from_seed(seed: &str) -> Result<Self, AuthError> {
        let key = KeyPair::from_seed(seed.trim()).map_err(|e| AuthError::InvalidSeed(e.to_string()))?;
        let public_key = key.public_key();

        if !public_key.starts_with(ACCOUNT_KEY_PREFIX) {
            return Err(AuthError::InvalidSeed(format!(
                "expected an account seed, got a key for {public_key}"
            )));
        }

        Ok(Self { key, public_key })
    }

    /// Wraps an arbitrary key pair without checking its kind.
    #[cfg(any(test, feature = "testutil"))]
    pub(crate) fn from_key_pair(key: KeyPair) -> Self {
        let public_key = key.public_key();
        Self { key, public_key }
    }

    /// Public nkey written as `iss` of everything this signer signs.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub(crate) fn sign(&self, input: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.key.sign(input).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Mints a user token for `user_nkey` scoped to `audience`, the account
    /// the connection is admitted into.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be serialized or signed.
    pub fn sign_user(&self, user_nkey: &str, audience: &str) -> Result<String, AuthError> {
        encode_claims(Claims::new(user_nkey, audience, User::default()), self)
    }

    /// Signs the reply to an authorization request.
    ///
    /// The subject is the user nkey from the request and the audience is the
    /// id of the server that asked.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be serialized or signed.
    pub fn sign_response(
        &self,
        user_nkey: &str,
        server_id: &str,
        response: AuthorizationResponse,
    ) -> Result<String, AuthError> {
        encode_claims(Claims::new(user_nkey, server_id, response), self)
    }
}

//! Shared test utilities for the auth callout path.
//!
//! This module stands in for a NATS server: it holds a server nkey and signs
//! authorization requests the way a server would. It is feature-gated
//! behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! uniqname-authn = { workspace = true, features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use uniqname_authn::testutil::TestServer;
//!
//! let server = TestServer::new();
//! let token = server.request().username("staff").password("password").name("alice").sign();
//! ```

use nkeys::KeyPair;
use zeroize::Zeroizing;

use crate::{
    claims::{AUTHORIZATION_REQUEST_AUDIENCE, AuthorizationRequest, Claims, ServerId},
    jwt::encode_claims,
    signer::Signer,
};

/// Generates a fresh account seed, suitable for [`Signer::from_seed`].
pub fn generate_account_seed() -> Zeroizing<String> {
    Zeroizing::new(KeyPair::new_account().seed().expect("fresh account key has a seed"))
}

/// A signer over a freshly generated account key.
pub fn account_signer() -> Signer {
    Signer::from_seed(&generate_account_seed()).expect("generated seed is an account seed")
}

/// A fake server that issues signed authorization requests.
pub struct TestServer {
    signer: Signer,
    name: String,
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServer {
    /// A server with a fresh server nkey.
    pub fn new() -> Self {
        Self::with_key(KeyPair::new_server())
    }

    /// A "server" that signs with a key of another kind, e.g. an account.
    pub fn with_key(key: KeyPair) -> Self {
        Self { signer: Signer::from_key_pair(key), name: "test-server".to_owned() }
    }

    /// The server's public nkey, which is also its id.
    pub fn id(&self) -> &str {
        self.signer.public_key()
    }

    /// Starts building a request issued by this server.
    pub fn request(&self) -> RequestBuilder<'_> {
        RequestBuilder {
            server: self,
            user_nkey: KeyPair::new_user().public_key(),
            username: String::new(),
            password: String::new(),
            name: String::new(),
            client_id: 1,
            audience: AUTHORIZATION_REQUEST_AUDIENCE.to_owned(),
            server_id: None,
        }
    }
}

/// Builder for a signed authorization request.
pub struct RequestBuilder<'a> {
    server: &'a TestServer,
    user_nkey: String,
    username: String,
    password: String,
    name: String,
    client_id: u64,
    audience: String,
    server_id: Option<String>,
}

impl RequestBuilder<'_> {
    /// CONNECT username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// CONNECT password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Client display name, set in both client info and CONNECT.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Connection id assigned by the server.
    #[must_use]
    pub fn client_id(mut self, id: u64) -> Self {
        self.client_id = id;
        self
    }

    /// Overrides the audience (default `nats-authorization-request`).
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Overrides `server_id.id`, which otherwise equals the issuer.
    #[must_use]
    pub fn server_id(mut self, id: impl Into<String>) -> Self {
        self.server_id = Some(id.into());
        self
    }

    /// The user nkey the request is for.
    pub fn user_nkey(&self) -> &str {
        &self.user_nkey
    }

    /// The unsigned claims.
    pub fn claims(&self) -> Claims<AuthorizationRequest> {
        let server = ServerId {
            name: self.server.name.clone(),
            host: "127.0.0.1".to_owned(),
            id: self.server_id.clone().unwrap_or_else(|| self.server.id().to_owned()),
            version: "2.10.0".to_owned(),
            ..ServerId::default()
        };

        let mut request = AuthorizationRequest::new(server, self.user_nkey.clone());
        request.client_info.id = self.client_id;
        request.client_info.name = self.name.clone();
        request.client_info.host = "127.0.0.1".to_owned();
        request.client_info.kind = "Client".to_owned();
        request.client_info.client_type = "nats".to_owned();
        request.connect_opts.username = self.username.clone();
        request.connect_opts.password = Zeroizing::new(self.password.clone());
        request.connect_opts.name = self.name.clone();
        request.connect_opts.lang = "rust".to_owned();
        request.connect_opts.protocol = 1;

        Claims::new(self.user_nkey.clone(), self.audience.clone(), request)
    }

    /// Signs the request with the server key.
    pub fn sign(&self) -> String {
        encode_claims(self.claims(), &self.server.signer).expect("test request should encode")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{jwt::decode_claims, validation::validate_authorization_request};

    #[test]
    fn test_signed_request_passes_validation() {
        let server = TestServer::new();
        let token = server.request().username("staff").password("password").name("alice").client_id(9).sign();

        let claims = decode_claims::<AuthorizationRequest>(&token).unwrap();
        validate_authorization_request(&claims).unwrap();
        assert_eq!(claims.data.iss, server.id());
        assert_eq!(claims.nats.client_info.id, 9);
        assert_eq!(claims.nats.connect_opts.password.as_str(), "password");
    }

    #[test]
    fn test_server_id_starts_with_n() {
        assert!(TestServer::new().id().starts_with('N'));
    }
}

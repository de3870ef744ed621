//! Auth callout request handling.
//!
//! Each request runs straight through:
//!
//! ```text
//! decode + verify -> validate envelope -> authenticate -> claim name -> sign reply
//! ```
//!
//! Malformed or foreign requests and infrastructure failures end with a
//! [`CalloutError`] and no reply, so the server times the client out.
//! Wrong credentials and taken names end with a signed denial.

use std::sync::Arc;

use bytes::Bytes;
use fail::fail_point;
use uniqname_authn::{
    AccountTable, AuthError, AuthorizationRequest, Signer, authenticate, decode_claims,
    validate_authorization_request,
};
use uniqname_storage::StorageBackend;

use crate::{
    decision::Decision,
    error::CalloutError,
    reservation::{ClaimOutcome, NameReservations},
};

/// A signed reply and the name reserved for it, if any.
struct Prepared {
    reply: Bytes,
    claimed: Option<(String, u64)>,
}

/// Answers authorization requests from `$SYS.REQ.USER.AUTH`.
pub struct AuthCalloutHandler<S: ?Sized> {
    accounts: Arc<AccountTable>,
    reservations: NameReservations<S>,
    signer: Arc<Signer>,
}

impl<S: ?Sized> Clone for AuthCalloutHandler<S> {
    fn clone(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
            reservations: self.reservations.clone(),
            signer: Arc::clone(&self.signer),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for AuthCalloutHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCalloutHandler")
            .field("accounts", &self.accounts)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

impl<S: StorageBackend + ?Sized> AuthCalloutHandler<S> {
    /// Creates a handler over the managed accounts, the reservation store
    /// and the callout signing key.
    pub fn new(accounts: Arc<AccountTable>, store: Arc<S>, signer: Arc<Signer>) -> Self {
        Self { accounts, reservations: NameReservations::new(store), signer }
    }

    /// Processes one raw request and returns the signed reply payload.
    ///
    /// A name claimed for this request is released again if the reply
    /// cannot be signed.
    ///
    /// # Errors
    ///
    /// - [`CalloutError::Protocol`] if the request does not decode, verify
    ///   or pass the envelope checks
    /// - [`CalloutError::Storage`] if the name could not be claimed
    /// - [`CalloutError::Signing`] if the user token or reply cannot be signed
    pub async fn handle(&self, payload: &[u8]) -> Result<Bytes, CalloutError> {
        self.prepare(payload).await.map(|prepared| prepared.reply)
    }

    /// Processes one raw request and hands the signed reply to `publish`.
    ///
    /// If publishing fails, a name claimed for this request is released so
    /// the client can retry under the same name.
    ///
    /// # Errors
    ///
    /// Everything [`handle`](Self::handle) returns, plus
    /// [`CalloutError::Publish`] if `publish` fails.
    pub async fn respond<F, Fut, E>(&self, payload: &[u8], publish: F) -> Result<(), CalloutError>
    where
        F: FnOnce(Bytes) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Prepared { reply, claimed } = self.prepare(payload).await?;
        if let Err(error) = publish(reply).await {
            if let Some((name, id)) = claimed {
                self.roll_back(&name, id).await;
            }
            return Err(CalloutError::Publish(error.into()));
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(client_id, name, account))]
    async fn prepare(&self, payload: &[u8]) -> Result<Prepared, CalloutError> {
        let token = std::str::from_utf8(payload)
            .map_err(|e| AuthError::invalid_token_format(format!("request is not UTF-8: {e}")))?;
        let claims = decode_claims::<AuthorizationRequest>(token)?;
        validate_authorization_request(&claims)?;

        let request = &claims.nats;
        let client = &request.client_info;
        let span = tracing::Span::current();
        span.record("client_id", client.id);
        span.record("name", client.name.as_str());

        let decision = self.decide(request).await?;
        // Only authenticated grants hold a reservation.
        let claimed = match &decision {
            Decision::Granted { audience } => {
                span.record("account", audience.as_str());
                (!request.connect_opts.username.is_empty()).then(|| (client.name.clone(), client.id))
            },
            _ => None,
        };
        tracing::debug!(?decision, "Authorization decided");

        match self.sign(decision, request) {
            Ok(reply) => Ok(Prepared { reply, claimed }),
            Err(error) => {
                if let Some((name, id)) = claimed {
                    self.roll_back(&name, id).await;
                }
                Err(error)
            },
        }
    }

    fn sign(&self, decision: Decision, request: &AuthorizationRequest) -> Result<Bytes, CalloutError> {
        fail_point!("callout-sign-response", |_| Err(CalloutError::Signing(AuthError::Signing(
            "injected failure: callout-sign-response".to_owned()
        ))));

        let response = decision.into_response(&self.signer, &request.user_nkey)?;
        let reply = self.signer.sign_response(&request.user_nkey, &request.server_id.id, response)?;
        Ok(Bytes::from(reply))
    }

    /// Releases a name claimed for a request that never got its reply out.
    async fn roll_back(&self, name: &str, id: u64) {
        match self.reservations.release(name, id).await {
            Ok(outcome) => tracing::info!(%name, client_id = id, ?outcome, "Rolled back unanswered name claim"),
            Err(error) => {
                tracing::error!(%name, client_id = id, %error, "Failed to roll back name claim; name stays reserved");
            },
        }
    }

    /// Decides a validated request.
    ///
    /// Anonymous requests (empty username) are granted into the default
    /// audience without touching the store. Wrong credentials are denied
    /// without touching the store. Otherwise the client's display name is
    /// claimed for its connection id.
    ///
    /// # Errors
    ///
    /// Returns [`CalloutError::Storage`] if the claim fails for any reason
    /// other than the name being taken.
    pub async fn decide(&self, request: &AuthorizationRequest) -> Result<Decision, CalloutError> {
        let opts = &request.connect_opts;
        if opts.username.is_empty() {
            return Ok(Decision::anonymous());
        }

        let Some(account) = authenticate(&self.accounts, &opts.username, &opts.password) else {
            tracing::debug!(username = %opts.username, "Credentials rejected");
            return Ok(Decision::AuthFailed);
        };

        let client = &request.client_info;
        match self.reservations.claim(&client.name, client.id).await? {
            ClaimOutcome::Claimed => Ok(Decision::granted(account)),
            ClaimOutcome::AlreadyHeld => {
                tracing::info!(name = %client.name, client_id = client.id, "Display name already in use");
                Ok(Decision::NameConflict)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use uniqname_authn::{
        AuthorizationResponse, User,
        testutil::{TestServer, account_signer},
    };
    use uniqname_storage::MemoryBackend;

    use super::*;

    fn handler() -> (AuthCalloutHandler<MemoryBackend>, MemoryBackend) {
        let backend = MemoryBackend::new();
        let accounts = AccountTable::new().with_user("APP", "staff", "password");
        let handler =
            AuthCalloutHandler::new(Arc::new(accounts), Arc::new(backend.clone()), Arc::new(account_signer()));
        (handler, backend)
    }

    fn response(reply: &Bytes) -> AuthorizationResponse {
        decode_claims::<AuthorizationResponse>(std::str::from_utf8(reply).unwrap()).unwrap().nats
    }

    #[tokio::test]
    async fn test_grant_then_conflict() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let first = server.request().username("staff").password("password").name("alice").client_id(1);
        let second = server.request().username("staff").password("password").name("alice").client_id(2);

        let granted = response(&handler.handle(first.sign().as_bytes()).await.unwrap());
        assert!(granted.error.is_empty());
        assert_eq!(decode_claims::<User>(&granted.jwt).unwrap().data.aud, "APP");

        let denied = response(&handler.handle(second.sign().as_bytes()).await.unwrap());
        assert_eq!(denied.error, "Unique Client Name Required");
        assert!(denied.jwt.is_empty());

        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_is_addressed_to_user_and_server() {
        let (handler, _) = handler();
        let server = TestServer::new();
        let request = server.request().username("staff").password("password").name("bob");

        let reply = handler.handle(request.sign().as_bytes()).await.unwrap();
        let claims = decode_claims::<AuthorizationResponse>(std::str::from_utf8(&reply).unwrap()).unwrap();

        assert_eq!(claims.data.sub, request.user_nkey());
        assert_eq!(claims.data.aud, server.id());
        assert_eq!(claims.data.iss, handler.signer.public_key());
    }

    #[tokio::test]
    async fn test_wrong_password_is_denied_without_store_access() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let request = server.request().username("staff").password("wrong").name("alice");

        let denied = response(&handler.handle(request.sign().as_bytes()).await.unwrap());
        assert_eq!(denied.error, "Authentication Failed");
        assert_eq!(backend.op_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_denied() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let request = server.request().username("ghost").password("password").name("alice");

        assert_eq!(response(&handler.handle(request.sign().as_bytes()).await.unwrap()).error, "Authentication Failed");
        assert_eq!(backend.op_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_is_granted_default_audience() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let request = server.request().name("alice");

        let granted = response(&handler.handle(request.sign().as_bytes()).await.unwrap());
        assert_eq!(decode_claims::<User>(&granted.jwt).unwrap().data.aud, "$G");
        assert_eq!(backend.op_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_with_password_is_granted() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let request = server.request().password("password").name("alice");

        let granted = response(&handler.handle(request.sign().as_bytes()).await.unwrap());
        assert!(granted.error.is_empty());
        assert_eq!(decode_claims::<User>(&granted.jwt).unwrap().data.aud, "$G");
        assert_eq!(backend.op_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_protocol_errors_produce_no_reply() {
        let (handler, backend) = handler();
        let server = TestServer::new();

        let wrong_audience = server.request().username("staff").password("password").audience("APP").sign();
        let spoofed = server.request().username("staff").password("password").server_id("NOTHER").sign();

        for payload in [b"garbage".to_vec(), vec![0xff, 0xfe], wrong_audience.into_bytes(), spoofed.into_bytes()] {
            let err = handler.handle(&payload).await.unwrap_err();
            assert!(err.is_protocol_error(), "expected protocol error, got {err:?}");
        }
        assert_eq!(backend.op_counts().total(), 0);
    }

    #[tokio::test]
    async fn test_decide_claims_with_connection_id() {
        let (handler, _) = handler();
        let server = TestServer::new();
        let claims = server.request().username("staff").password("password").name("x").client_id(u64::MAX).claims();

        assert_eq!(handler.decide(&claims.nats).await.unwrap(), Decision::granted("APP"));
        assert_eq!(handler.reservations.owner("x").await.unwrap(), Some(u64::MAX));
    }

    #[tokio::test]
    async fn test_publish_failure_releases_claimed_name() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let token = server.request().username("staff").password("password").name("alice").client_id(7).sign();

        let err = handler
            .respond(token.as_bytes(), |_| async { Err::<(), _>(std::io::Error::other("connection closed")) })
            .await
            .unwrap_err();

        assert!(matches!(err, CalloutError::Publish(_)), "got: {err:?}");
        assert!(!err.is_protocol_error());
        assert!(backend.is_empty());
        assert_eq!(handler.reservations.owner("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_other_holder() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let holder = server.request().username("staff").password("password").name("alice").client_id(1).sign();
        let rival = server.request().username("staff").password("password").name("alice").client_id(2).sign();
        handler.handle(holder.as_bytes()).await.unwrap();

        let err = handler
            .respond(rival.as_bytes(), |_| async { Err::<(), _>(std::io::Error::other("connection closed")) })
            .await
            .unwrap_err();

        assert!(matches!(err, CalloutError::Publish(_)));
        assert_eq!(backend.len(), 1);
        assert_eq!(handler.reservations.owner("alice").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_respond_publishes_signed_reply() {
        let (handler, backend) = handler();
        let server = TestServer::new();
        let token = server.request().username("staff").password("password").name("alice").sign();
        let mut published = None;

        handler
            .respond(token.as_bytes(), |reply| {
                published = Some(reply);
                async { Ok::<(), std::io::Error>(()) }
            })
            .await
            .unwrap();

        assert!(response(&published.unwrap()).error.is_empty());
        assert_eq!(backend.len(), 1);
    }
}

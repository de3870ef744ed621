//! End-to-end behaviour of the callout handler and the disconnect reaper
//! sharing one reservation store, without a NATS server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use bytes::Bytes;
use uniqname_authn::{
    AccountTable, AuthorizationResponse, Signer, User, decode_claims,
    testutil::{TestServer, account_signer},
};
use uniqname_callout::{AuthCalloutHandler, DisconnectReaper, ReapOutcome, ReaperError};
use uniqname_storage::{MemoryBackend, StorageBackend, testutil::seeded_backend};

struct Harness {
    handler: AuthCalloutHandler<MemoryBackend>,
    reaper: DisconnectReaper<MemoryBackend>,
    backend: MemoryBackend,
    server: TestServer,
    signer_key: String,
}

impl Harness {
    fn new() -> Self {
        Self::with_accounts(AccountTable::new().with_user("APP", "staff", "password"))
    }

    fn with_accounts(accounts: AccountTable) -> Self {
        let backend = MemoryBackend::new();
        let store = Arc::new(backend.clone());
        let accounts = Arc::new(accounts);
        let signer: Signer = account_signer();
        let signer_key = signer.public_key().to_owned();

        Self {
            handler: AuthCalloutHandler::new(Arc::clone(&accounts), Arc::clone(&store), Arc::new(signer)),
            reaper: DisconnectReaper::new(accounts, store),
            backend,
            server: TestServer::new(),
            signer_key,
        }
    }

    async fn connect(&self, username: &str, password: &str, name: &str, id: u64) -> AuthorizationResponse {
        let token = self.server.request().username(username).password(password).name(name).client_id(id).sign();
        let reply = self.handler.handle(token.as_bytes()).await.expect("request should be answered");
        decode_reply(&reply, &self.signer_key)
    }

    async fn disconnect(&self, account: &str, name: &str, id: u64) -> Result<ReapOutcome, ReaperError> {
        let payload = serde_json::json!({
            "type": "io.nats.server.advisory.v1.client_disconnect",
            "id": "evt",
            "client": { "id": id, "acc": account, "name": name, "rtt": "1ms" },
            "reason": "Client Closed",
        });
        self.reaper.handle(&serde_json::to_vec(&payload).unwrap()).await
    }
}

fn decode_reply(reply: &Bytes, issuer: &str) -> AuthorizationResponse {
    let claims = decode_claims::<AuthorizationResponse>(std::str::from_utf8(reply).unwrap()).unwrap();
    assert_eq!(claims.data.iss, issuer);
    claims.nats
}

fn granted_audience(response: &AuthorizationResponse) -> String {
    assert!(response.error.is_empty(), "expected a grant, got denial {:?}", response.error);
    decode_claims::<User>(&response.jwt).unwrap().data.aud
}

#[tokio::test]
async fn unique_name_lifecycle() {
    let harness = Harness::new();

    let c1 = harness.connect("staff", "password", "alice", 1).await;
    assert_eq!(granted_audience(&c1), "APP");

    let c2 = harness.connect("staff", "password", "alice", 2).await;
    assert_eq!(c2.error, "Unique Client Name Required");
    assert!(c2.jwt.is_empty());

    assert_eq!(harness.disconnect("APP", "alice", 1).await.unwrap(), ReapOutcome::Released);

    let c3 = harness.connect("staff", "password", "alice", 3).await;
    assert_eq!(granted_audience(&c3), "APP");
}

#[tokio::test]
async fn exactly_one_of_many_concurrent_claims_wins() {
    for n in [1_u64, 2, 16, 64] {
        let harness = Arc::new(Harness::new());

        let tasks: Vec<_> = (0..n)
            .map(|id| {
                let harness = Arc::clone(&harness);
                tokio::spawn(async move { harness.connect("staff", "password", "racer", id).await })
            })
            .collect();

        let mut granted = 0;
        let mut conflicts = 0;
        for task in tasks {
            let response = task.await.unwrap();
            if response.error.is_empty() {
                granted += 1;
            } else {
                assert_eq!(response.error, "Unique Client Name Required");
                conflicts += 1;
            }
        }

        assert_eq!(granted, 1, "n = {n}");
        assert_eq!(conflicts, n - 1, "n = {n}");
        assert_eq!(harness.backend.len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_on_worker_threads() {
    let harness = Arc::new(Harness::new());
    let tasks: Vec<_> = (0..32_u64)
        .map(|id| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move { harness.connect("staff", "password", "shared", id).await.error.is_empty() })
        })
        .collect();

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn anonymous_connections_never_touch_the_store() {
    let harness = Harness::new();

    for (id, name) in [(1, "alice"), (2, "alice"), (3, "")] {
        let response = harness.connect("", "", name, id).await;
        assert_eq!(granted_audience(&response), "$G");
    }
    // Even a password without a username is anonymous.
    assert_eq!(granted_audience(&harness.connect("", "password", "bob", 4).await), "$G");

    assert_eq!(harness.backend.op_counts().total(), 0);
}

#[tokio::test]
async fn wrong_credentials_never_write() {
    let harness = Harness::new();

    for (username, password) in [("staff", "wrong"), ("staff", ""), ("nobody", "password"), ("STAFF", "password")] {
        let response = harness.connect(username, password, "alice", 1).await;
        assert_eq!(response.error, "Authentication Failed", "{username}/{password}");
        assert!(response.jwt.is_empty());
    }

    assert_eq!(harness.backend.op_counts().writes(), 0);
    assert!(harness.backend.is_empty());

    // The name is still free for a correct login.
    assert_eq!(granted_audience(&harness.connect("staff", "password", "alice", 2).await), "APP");
}

#[tokio::test]
async fn auth_failure_takes_precedence_over_name_conflict() {
    let harness = Harness::new();
    harness.connect("staff", "password", "alice", 1).await;

    let response = harness.connect("staff", "bad", "alice", 2).await;
    assert_eq!(response.error, "Authentication Failed");
}

#[tokio::test]
async fn duplicate_disconnect_is_a_noop() {
    let harness = Harness::new();
    harness.connect("staff", "password", "alice", 5).await;

    assert_eq!(harness.disconnect("APP", "alice", 5).await.unwrap(), ReapOutcome::Released);
    assert_eq!(harness.disconnect("APP", "alice", 5).await.unwrap(), ReapOutcome::AlreadyReleased);
    assert!(harness.backend.is_empty());
}

#[tokio::test]
async fn delayed_disconnect_does_not_free_newer_reservation() {
    let harness = Harness::new();

    assert_eq!(granted_audience(&harness.connect("staff", "password", "X", 10).await), "APP");
    assert_eq!(harness.disconnect("APP", "X", 10).await.unwrap(), ReapOutcome::Released);
    assert_eq!(granted_audience(&harness.connect("staff", "password", "X", 11).await), "APP");

    let stale = harness.disconnect("APP", "X", 10).await.unwrap_err();
    assert!(matches!(stale, ReaperError::OwnerMismatch { stored: 11, disconnected: 10, .. }));

    let key = uniqname_callout::reservation_key("X");
    assert_eq!(harness.backend.get(key.as_bytes()).await.unwrap(), Some(Bytes::from("11")));

    // Still held: a third connection is refused.
    assert_eq!(harness.connect("staff", "password", "X", 12).await.error, "Unique Client Name Required");
}

#[tokio::test]
async fn unmanaged_account_disconnect_is_ignored() {
    let harness = Harness::new();
    harness.connect("staff", "password", "alice", 1).await;
    let before = harness.backend.op_counts();

    assert_eq!(harness.disconnect("SYS", "alice", 1).await.unwrap(), ReapOutcome::Unmanaged);
    assert_eq!(harness.backend.op_counts(), before);
    assert_eq!(harness.backend.len(), 1);
}

#[tokio::test]
async fn granted_token_audience_matches_credential_account() {
    let accounts = AccountTable::new()
        .with_user("APP", "staff", "password")
        .with_user("OPS", "oncall", "pager")
        .with_account("EMPTY");
    let harness = Harness::with_accounts(accounts);

    assert_eq!(granted_audience(&harness.connect("staff", "password", "a", 1).await), "APP");
    assert_eq!(granted_audience(&harness.connect("oncall", "pager", "b", 2).await), "OPS");
}

#[tokio::test]
async fn names_are_scoped_cluster_wide_not_per_account() {
    let accounts = AccountTable::new().with_user("APP", "staff", "password").with_user("OPS", "oncall", "pager");
    let harness = Harness::with_accounts(accounts);

    assert_eq!(granted_audience(&harness.connect("staff", "password", "shared", 1).await), "APP");
    assert_eq!(harness.connect("oncall", "pager", "shared", 2).await.error, "Unique Client Name Required");
}

#[tokio::test]
async fn unnamed_clients_share_one_reservation() {
    let harness = Harness::new();

    assert_eq!(granted_audience(&harness.connect("staff", "password", "", 1).await), "APP");
    assert_eq!(harness.connect("staff", "password", "", 2).await.error, "Unique Client Name Required");
}

#[tokio::test]
async fn instances_sharing_a_store_agree() {
    let backend = MemoryBackend::new();
    let accounts = Arc::new(AccountTable::new().with_user("APP", "staff", "password"));
    let server = TestServer::new();

    let first = AuthCalloutHandler::new(Arc::clone(&accounts), Arc::new(backend.clone()), Arc::new(account_signer()));
    let second = AuthCalloutHandler::new(Arc::clone(&accounts), Arc::new(backend.clone()), Arc::new(account_signer()));

    let token = |id| server.request().username("staff").password("password").name("alice").client_id(id).sign();
    let a = first.handle(token(1).as_bytes()).await.unwrap();
    let b = second.handle(token(2).as_bytes()).await.unwrap();

    let a = decode_claims::<AuthorizationResponse>(std::str::from_utf8(&a).unwrap()).unwrap().nats;
    let b = decode_claims::<AuthorizationResponse>(std::str::from_utf8(&b).unwrap()).unwrap().nats;
    assert!(a.error.is_empty());
    assert_eq!(b.error, "Unique Client Name Required");

    let reaper = DisconnectReaper::new(accounts, Arc::new(backend.clone()));
    let event = br#"{"client":{"id":1,"acc":"APP","name":"alice"}}"#;
    assert_eq!(reaper.handle(event).await.unwrap(), ReapOutcome::Released);
}

#[tokio::test]
async fn reservations_survive_instance_restart() {
    // A reservation written by an earlier instance, keyed by base64("alice").
    let backend = seeded_backend([("UNIQUER/YWxpY2U=", "41")]).await;
    let accounts = Arc::new(AccountTable::new().with_user("APP", "staff", "password"));
    let handler = AuthCalloutHandler::new(Arc::clone(&accounts), Arc::new(backend.clone()), Arc::new(account_signer()));
    let reaper = DisconnectReaper::new(accounts, Arc::new(backend.clone()));
    let server = TestServer::new();

    let token = server.request().username("staff").password("password").name("alice").client_id(42).sign();
    let reply = handler.handle(token.as_bytes()).await.unwrap();
    let response = decode_claims::<AuthorizationResponse>(std::str::from_utf8(&reply).unwrap()).unwrap().nats;
    assert_eq!(response.error, "Unique Client Name Required");

    assert_eq!(
        reaper.handle(br#"{"client":{"id":41,"acc":"APP","name":"alice"}}"#).await.unwrap(),
        ReapOutcome::Released
    );
    assert!(backend.is_empty());
}

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Store failures injected with fail points.
//!
//! ```bash
//! cargo test -p uniqname-callout --features failpoints --test failpoint_tests
//! ```
#![cfg(feature = "failpoints")]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uniqname_authn::{AccountTable, testutil::{TestServer, account_signer, generate_account_seed}};
use uniqname_callout::{
    AuthCalloutHandler, CalloutError, DisconnectReaper, NameReservations, ReaperError, Service, ServiceConfig,
    ServiceError,
};
use uniqname_storage::{MemoryBackend, StorageError};

fn accounts() -> Arc<AccountTable> {
    Arc::new(AccountTable::new().with_user("APP", "staff", "password"))
}

#[tokio::test]
async fn claim_failure_drops_request_without_reply() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-compare-and-set", "return").expect("failed to configure fail point");

    let backend = MemoryBackend::new();
    let handler = AuthCalloutHandler::new(accounts(), Arc::new(backend.clone()), Arc::new(account_signer()));
    let token = TestServer::new().request().username("staff").password("password").name("alice").sign();

    let err = handler.handle(token.as_bytes()).await.unwrap_err();
    assert!(matches!(err, CalloutError::Storage(StorageError::Connection { .. })), "got: {err:?}");
    assert!(!err.is_protocol_error());
    assert!(backend.is_empty());

    // Anonymous requests never reach the store, so they are unaffected.
    let anonymous = TestServer::new().request().name("alice").sign();
    assert!(handler.handle(anonymous.as_bytes()).await.is_ok());

    scenario.teardown();
}

#[tokio::test]
async fn handler_recovers_after_store_failure() {
    let scenario = fail::FailScenario::setup();
    let backend = MemoryBackend::new();
    let handler = AuthCalloutHandler::new(accounts(), Arc::new(backend.clone()), Arc::new(account_signer()));
    let server = TestServer::new();

    fail::cfg("memory-compare-and-set", "1*return").expect("failed to configure fail point");
    let token = server.request().username("staff").password("password").name("alice").client_id(1).sign();
    assert!(handler.handle(token.as_bytes()).await.is_err());

    let token = server.request().username("staff").password("password").name("alice").client_id(2).sign();
    assert!(handler.handle(token.as_bytes()).await.is_ok());
    assert_eq!(backend.len(), 1);

    scenario.teardown();
}

#[tokio::test]
async fn signing_failure_releases_claimed_name() {
    let scenario = fail::FailScenario::setup();
    let backend = MemoryBackend::new();
    let handler = AuthCalloutHandler::new(accounts(), Arc::new(backend.clone()), Arc::new(account_signer()));
    let server = TestServer::new();

    fail::cfg("callout-sign-response", "1*return").expect("failed to configure fail point");
    let token = server.request().username("staff").password("password").name("alice").client_id(1).sign();
    let err = handler.handle(token.as_bytes()).await.unwrap_err();

    assert!(matches!(err, CalloutError::Signing(_)), "got: {err:?}");
    assert!(backend.is_empty(), "claimed name must be released");
    assert_eq!(NameReservations::new(Arc::new(backend.clone())).owner("alice").await.unwrap(), None);

    // The same name is immediately available to the next attempt.
    let token = server.request().username("staff").password("password").name("alice").client_id(2).sign();
    assert!(handler.handle(token.as_bytes()).await.is_ok());
    assert_eq!(NameReservations::new(Arc::new(backend.clone())).owner("alice").await.unwrap(), Some(2));

    scenario.teardown();
}

#[tokio::test]
async fn reaper_read_failure_is_reported() {
    let scenario = fail::FailScenario::setup();
    let backend = MemoryBackend::new();
    NameReservations::new(Arc::new(backend.clone())).claim("alice", 1).await.unwrap();

    fail::cfg("memory-get", "return").expect("failed to configure fail point");
    let reaper = DisconnectReaper::new(accounts(), Arc::new(backend.clone()));
    let err = reaper.handle(br#"{"client":{"id":1,"acc":"APP","name":"alice"}}"#).await.unwrap_err();

    assert!(matches!(err, ReaperError::Storage(StorageError::Connection { .. })), "got: {err:?}");
    assert_eq!(backend.len(), 1);

    scenario.teardown();
}

#[tokio::test]
async fn reaper_delete_failure_keeps_reservation() {
    let scenario = fail::FailScenario::setup();
    let backend = MemoryBackend::new();
    NameReservations::new(Arc::new(backend.clone())).claim("alice", 1).await.unwrap();

    fail::cfg("memory-compare-and-delete", "return").expect("failed to configure fail point");
    let reaper = DisconnectReaper::new(accounts(), Arc::new(backend.clone()));
    let err = reaper.handle(br#"{"client":{"id":1,"acc":"APP","name":"alice"}}"#).await.unwrap_err();

    assert!(matches!(err, ReaperError::Storage(_)), "got: {err:?}");
    assert_eq!(backend.len(), 1);

    scenario.teardown();
}

#[tokio::test]
async fn failed_health_check_is_fatal() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("health-check", "return").expect("failed to configure fail point");

    let seed = generate_account_seed();
    let config = ServiceConfig::builder().seed(seed.as_str()).build().expect("valid config");
    let err = Service::start_with_store(config, Arc::new(MemoryBackend::new()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::StoreHealthCheck(_)), "got: {err:?}");

    scenario.teardown();
}

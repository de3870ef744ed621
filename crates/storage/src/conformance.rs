//! Conformance test suite for [`StorageBackend`] implementations.
//!
//! Every backend, in-memory or Redis-backed, must satisfy the same contract
//! for the reservation layer to be correct. Each function below checks one
//! aspect of that contract against a fresh backend:
//!
//! ```no_run
//! use uniqname_storage::{MemoryBackend, conformance};
//!
//! #[tokio::test]
//! async fn cas_insert_if_absent_conflicts_when_present() {
//!     conformance::cas_insert_if_absent_conflicts_when_present(&MemoryBackend::new()).await;
//! }
//! ```
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | Basic get/set/delete semantics |
//! | CAS | `compare_and_set` preconditions |
//! | CAD | `compare_and_delete` preconditions |
//! | Concurrent | Exactly one winner under contention |

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinSet;

use crate::{assert_conflict, backend::StorageBackend, error::StorageError, health::HealthProbe};

// ============================================================================
// CRUD
// ============================================================================

/// `get` on a nonexistent key returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_key<B: StorageBackend>(backend: &B) {
    let result = backend.get(b"conformance/nonexistent").await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None, "missing key should return None");
}

/// `set` then `get` round-trips the value, and a second `set` overwrites it.
pub async fn crud_set_overwrites_existing<B: StorageBackend>(backend: &B) {
    backend.set(b"conformance/k1".to_vec(), b"original".to_vec()).await.expect("set");
    backend.set(b"conformance/k1".to_vec(), b"updated".to_vec()).await.expect("overwrite");
    let val = backend.get(b"conformance/k1").await.expect("get");
    assert_eq!(val, Some(Bytes::from("updated")));
}

/// `delete` removes a key and deleting it again is a silent no-op.
pub async fn crud_delete_is_idempotent<B: StorageBackend>(backend: &B) {
    backend.set(b"conformance/k2".to_vec(), b"val".to_vec()).await.expect("set");
    backend.delete(b"conformance/k2").await.expect("delete");
    backend.delete(b"conformance/k2").await.expect("second delete should be a no-op");
    let val = backend.get(b"conformance/k2").await.expect("get after delete");
    assert_eq!(val, None, "key should be gone after delete");
}

/// The liveness probe succeeds on a working backend.
pub async fn health_liveness_is_healthy<B: StorageBackend>(backend: &B) {
    let status = backend.health_check(HealthProbe::Liveness).await.expect("probe should run");
    assert!(status.is_healthy(), "liveness probe should pass: {status}");
}

// ============================================================================
// CAS
// ============================================================================

/// Insert-if-absent succeeds on a missing key.
pub async fn cas_insert_if_absent_succeeds<B: StorageBackend>(backend: &B) {
    backend
        .compare_and_set(b"conformance/cas1", None, b"1".to_vec())
        .await
        .expect("insert-if-absent on a missing key should succeed");
    let val = backend.get(b"conformance/cas1").await.expect("get");
    assert_eq!(val, Some(Bytes::from("1")));
}

/// Insert-if-absent on a present key conflicts and leaves the value alone.
pub async fn cas_insert_if_absent_conflicts_when_present<B: StorageBackend>(backend: &B) {
    backend.compare_and_set(b"conformance/cas2", None, b"1".to_vec()).await.expect("first claim");
    let result = backend.compare_and_set(b"conformance/cas2", None, b"2".to_vec()).await;
    assert_conflict!(result, "second insert-if-absent");
    let val = backend.get(b"conformance/cas2").await.expect("get");
    assert_eq!(val, Some(Bytes::from("1")), "losing claim must not overwrite");
}

/// Update-if-unchanged succeeds only against the current value.
pub async fn cas_update_requires_current_value<B: StorageBackend>(backend: &B) {
    backend.set(b"conformance/cas3".to_vec(), b"a".to_vec()).await.expect("set");
    backend
        .compare_and_set(b"conformance/cas3", Some(b"a"), b"b".to_vec())
        .await
        .expect("update from current value");
    let stale = backend.compare_and_set(b"conformance/cas3", Some(b"a"), b"c".to_vec()).await;
    assert_conflict!(stale, "update from stale value");
    let missing = backend.compare_and_set(b"conformance/cas3-missing", Some(b"a"), b"c".to_vec()).await;
    assert_conflict!(missing, "update of missing key");
}

// ============================================================================
// CAD
// ============================================================================

/// `compare_and_delete` removes the key when the value matches.
pub async fn cad_deletes_on_match<B: StorageBackend>(backend: &B) {
    backend.set(b"conformance/cad1".to_vec(), b"7".to_vec()).await.expect("set");
    backend.compare_and_delete(b"conformance/cad1", b"7").await.expect("matching delete");
    assert_eq!(backend.get(b"conformance/cad1").await.expect("get"), None);
}

/// `compare_and_delete` leaves a different value in place.
pub async fn cad_mismatch_conflicts_and_keeps_value<B: StorageBackend>(backend: &B) {
    backend.set(b"conformance/cad2".to_vec(), b"8".to_vec()).await.expect("set");
    let result = backend.compare_and_delete(b"conformance/cad2", b"7").await;
    assert_conflict!(result, "mismatched delete");
    assert_eq!(backend.get(b"conformance/cad2").await.expect("get"), Some(Bytes::from("8")));
}

/// `compare_and_delete` on a missing key conflicts.
pub async fn cad_missing_key_conflicts<B: StorageBackend>(backend: &B) {
    let result = backend.compare_and_delete(b"conformance/cad3", b"7").await;
    assert_conflict!(result, "delete of missing key");
}

// ============================================================================
// Concurrent
// ============================================================================

/// `tasks` concurrent insert-if-absent calls on one key produce exactly one
/// winner; every loser sees [`StorageError::Conflict`].
pub async fn concurrent_insert_if_absent_single_winner<B>(backend: Arc<B>, tasks: usize)
where
    B: StorageBackend + 'static,
{
    let mut set = JoinSet::new();
    for task_id in 0..tasks {
        let backend = Arc::clone(&backend);
        set.spawn(async move {
            backend
                .compare_and_set(b"conformance/race", None, task_id.to_string().into_bytes())
                .await
        });
    }

    let mut successes = 0usize;
    let mut conflicts = 0usize;
    while let Some(result) = set.join_next().await {
        match result.expect("task should not panic") {
            Ok(()) => successes += 1,
            Err(StorageError::Conflict) => conflicts += 1,
            Err(e) => panic!("unexpected error during claim race: {e}"),
        }
    }

    assert_eq!(successes, 1, "exactly one claim should win, got {successes}");
    assert_eq!(conflicts, tasks - 1, "all other claims should conflict");
}

/// Runs every conformance check that needs a single clean backend.
///
/// Keys are namespaced under `conformance/`, so one backend can host the
/// whole run.
pub async fn run_all<B: StorageBackend>(backend: &B) {
    crud_get_returns_none_for_missing_key(backend).await;
    crud_set_overwrites_existing(backend).await;
    crud_delete_is_idempotent(backend).await;
    health_liveness_is_healthy(backend).await;
    cas_insert_if_absent_succeeds(backend).await;
    cas_insert_if_absent_conflicts_when_present(backend).await;
    cas_update_requires_current_value(backend).await;
    cad_deletes_on_match(backend).await;
    cad_mismatch_conflicts_and_keeps_value(backend).await;
    cad_missing_key_conflicts(backend).await;
}

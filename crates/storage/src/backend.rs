//! Storage backend trait definition.
//!
//! [`StorageBackend`] is the whole contract the reservation layer has with the
//! shared key-value store. Every method touches exactly one key and is atomic
//! on its own; there are no multi-key transactions and no client-side locks.
//! The conditional writes ([`compare_and_set`](StorageBackend::compare_and_set)
//! and [`compare_and_delete`](StorageBackend::compare_and_delete)) are the only
//! synchronization between service instances sharing a store.
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`StorageBackend`] trait.
//! 2. Make both conditional operations linearizable across every client of the store.
//! 3. Map backend-specific errors to [`StorageError`].
//! 4. Run the [`conformance`](crate::conformance) suite against it.
//!
//! See [`MemoryBackend`](crate::MemoryBackend) for a reference implementation.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::StorageResult,
    health::{HealthProbe, HealthStatus},
};

/// Abstract storage backend for atomic single-key operations.
///
/// Backends are `Send + Sync` and shared between concurrently running
/// handler tasks. The trait is object safe, so `Arc<dyn StorageBackend>`
/// works where static dispatch is inconvenient.
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Point read |
/// | [`set`](StorageBackend::set) | Unconditional write |
/// | [`compare_and_set`](StorageBackend::compare_and_set) | Insert-if-absent / update-if-unchanged |
/// | [`compare_and_delete`](StorageBackend::compare_and_delete) | Delete-if-unchanged |
/// | [`delete`](StorageBackend::delete) | Unconditional delete |
/// | [`health_check`](StorageBackend::health_check) | Probe backend availability |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use uniqname_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// backend.compare_and_set(b"UNIQUER/YWxpY2U=", None, b"7".to_vec()).await.unwrap();
/// let owner = backend.get(b"UNIQUER/YWxpY2U=").await.unwrap();
/// assert_eq!(owner, Some(Bytes::from("7")));
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>>;

    /// Stores a key-value pair, overwriting any existing value.
    ///
    /// Values never expire.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()>;

    /// Atomically sets a key's value if the current value matches `expected`.
    ///
    /// - **`expected: None`**: insert-if-absent. Succeeds only when the key does not exist. This is
    ///   the claim primitive: of any number of concurrent callers racing on an absent key, exactly
    ///   one succeeds.
    /// - **`expected: Some(value)`**: update-if-unchanged. Succeeds only when the current value is a
    ///   byte-for-byte match of `value`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) when the precondition does not
    ///   hold. Conflict is not transient and must not be retried blindly.
    /// - Connection or timeout errors from the backend.
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()>;

    /// Atomically deletes a key if its current value is exactly `expected`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Conflict`](crate::StorageError::Conflict) if the key is absent or holds a
    /// different value; the stored value is left untouched.
    #[must_use = "compare-and-delete may fail with a conflict and errors must be handled"]
    async fn compare_and_delete(&self, key: &[u8], expected: &[u8]) -> StorageResult<()>;

    /// Deletes a key.
    ///
    /// Deleting a missing key is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Checks backend health for the given [`HealthProbe`].
    ///
    /// - `Ok(HealthStatus::Healthy(_))`: probe passed
    /// - `Ok(HealthStatus::Unhealthy(_, reason))`: probe ran and failed
    /// - `Err(...)`: the probe itself could not be performed
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self, probe: HealthProbe) -> StorageResult<HealthStatus>;
}

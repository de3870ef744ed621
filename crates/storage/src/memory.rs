//! In-memory storage backend implementation.
//!
//! [`MemoryBackend`] keeps every key in a [`BTreeMap`] behind a single
//! [`parking_lot::RwLock`]. Conditional operations evaluate their precondition
//! and apply their write inside one write-lock critical section, which makes
//! them linearizable across every clone of the backend. That is exactly the
//! guarantee the name reservation layer needs from a real distributed store,
//! so handler tests can race any number of tasks against it.
//!
//! # Example
//!
//! ```
//! use uniqname_storage::{MemoryBackend, StorageBackend, StorageError};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.compare_and_set(b"UNIQUER/Ym9i", None, b"1".to_vec()).await.unwrap();
//!     let second = backend.compare_and_set(b"UNIQUER/Ym9i", None, b"2".to_vec()).await;
//!
//!     assert!(matches!(second, Err(StorageError::Conflict)));
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted and is not shared between processes, so several service instances
//!   only share reservations when they share one `MemoryBackend` value (tests).

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    health::{HealthMetadata, HealthProbe, HealthStatus},
};

/// Per-operation call counters.
#[derive(Debug, Default)]
struct OpCounters {
    get: AtomicU64,
    set: AtomicU64,
    compare_and_set: AtomicU64,
    compare_and_delete: AtomicU64,
    delete: AtomicU64,
}

/// Snapshot of how many times each [`StorageBackend`] operation was invoked
/// on a [`MemoryBackend`] (across all clones).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// Calls to `get`.
    pub get: u64,
    /// Calls to `set`.
    pub set: u64,
    /// Calls to `compare_and_set`.
    pub compare_and_set: u64,
    /// Calls to `compare_and_delete`.
    pub compare_and_delete: u64,
    /// Calls to `delete`.
    pub delete: u64,
}

impl OpCounts {
    /// Total number of operations of any kind.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.get + self.set + self.compare_and_set + self.compare_and_delete + self.delete
    }

    /// Number of operations that may have written to the store.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.set + self.compare_and_set + self.compare_and_delete + self.delete
    }
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same data and the same operation counters.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Bytes>>>,
    ops: Arc<OpCounters>,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times each operation has been called so far.
    #[must_use]
    pub fn op_counts(&self) -> OpCounts {
        OpCounts {
            get: self.ops.get.load(Ordering::Relaxed),
            set: self.ops.set.load(Ordering::Relaxed),
            compare_and_set: self.ops.compare_and_set.load(Ordering::Relaxed),
            compare_and_delete: self.ops.compare_and_delete.load(Ordering::Relaxed),
            delete: self.ops.delete.load(Ordering::Relaxed),
        }
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if no key is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("len", &self.len())
            .field("ops", &self.op_counts())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        self.ops.get.fetch_add(1, Ordering::Relaxed);
        fail_point!("memory-get", |_| Err(StorageError::connection("injected failure: memory-get")));

        let data = self.data.read();
        Ok(data.get(key).cloned())
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(&key)))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        self.ops.set.fetch_add(1, Ordering::Relaxed);

        self.data.write().insert(key, Bytes::from(value));
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        self.ops.compare_and_set.fetch_add(1, Ordering::Relaxed);
        fail_point!("memory-compare-and-set", |_| Err(StorageError::connection(
            "injected failure: memory-compare-and-set"
        )));

        let mut data = self.data.write();

        let matches = match (expected, data.get(key)) {
            (None, None) => true,
            (Some(exp), Some(cur)) => exp == &cur[..],
            _ => false,
        };

        if !matches {
            return Err(StorageError::Conflict);
        }

        data.insert(key.to_vec(), Bytes::from(new_value));
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn compare_and_delete(&self, key: &[u8], expected: &[u8]) -> StorageResult<()> {
        self.ops.compare_and_delete.fetch_add(1, Ordering::Relaxed);
        fail_point!("memory-compare-and-delete", |_| Err(StorageError::connection(
            "injected failure: memory-compare-and-delete"
        )));

        let mut data = self.data.write();

        match data.get(key) {
            Some(current) if current.as_ref() == expected => {
                data.remove(key);
                Ok(())
            },
            _ => Err(StorageError::Conflict),
        }
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.ops.delete.fetch_add(1, Ordering::Relaxed);
        fail_point!("memory-delete", |_| Err(StorageError::connection(
            "injected failure: memory-delete"
        )));

        self.data.write().remove(key);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn health_check(&self, probe: HealthProbe) -> StorageResult<HealthStatus> {
        fail_point!("health-check", |_| Err(StorageError::connection(
            "injected failure: health-check"
        )));

        let start = Instant::now();
        // Acquiring the read lock proves the map is not deadlocked.
        let entries = self.data.read().len();
        let metadata = HealthMetadata::new(start.elapsed(), "memory")
            .with_detail("entry_count", entries.to_string())
            .with_detail("probe", probe.to_string());

        Ok(HealthStatus::healthy(metadata))
    }
}

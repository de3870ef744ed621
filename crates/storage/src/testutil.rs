//! Shared test utilities for storage backend testing.
//!
//! Feature-gated behind `testutil` so that none of it reaches production
//! builds. Enable it from `[dev-dependencies]`:
//!
//! ```toml
//! [dev-dependencies]
//! uniqname-storage = { workspace = true, features = ["testutil"] }
//! ```

use crate::{StorageBackend, memory::MemoryBackend};

/// Create a [`MemoryBackend`] holding the given `(key, value)` pairs.
///
/// # Panics
///
/// Panics if any `set` operation fails (should not happen with `MemoryBackend`).
pub async fn seeded_backend<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> MemoryBackend
where
    K: Into<Vec<u8>>,
    V: Into<Vec<u8>>,
{
    let backend = MemoryBackend::new();
    for (key, value) in entries {
        backend.set(key.into(), value.into()).await.expect("seed set failed");
    }
    backend
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::Conflict`](crate::StorageError::Conflict).
///
/// ```no_run
/// use uniqname_storage::assert_conflict;
/// use uniqname_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::Conflict);
/// assert_conflict!(result);
/// ```
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict)),
            "{}: expected StorageError::Conflict, got: {:?}",
            $msg,
            $result,
        );
    };
}

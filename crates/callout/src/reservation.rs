//! Cluster-wide display name reservations.
//!
//! A reservation is a single key in the shared store:
//!
//! ```text
//! "UNIQUER/" + base64(display name)  ->  decimal connection id
//! ```
//!
//! Claiming is insert-if-absent, so the store alone decides which of any
//! number of concurrent connections gets a name. Releasing is
//! delete-if-still-mine, so a late disconnect for an old connection can
//! never free a name a newer connection holds. Keys never expire.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use uniqname_storage::{StorageBackend, StorageError, StorageResult};

/// Prefix shared by every reservation key.
pub const KEY_PREFIX: &str = "UNIQUER/";

/// Store key for a display name.
///
/// The empty name maps to the bare prefix, so all unnamed clients share one
/// reservation.
#[must_use]
pub fn reservation_key(name: &str) -> String {
    format!("{KEY_PREFIX}{}", STANDARD.encode(name))
}

/// Result of [`NameReservations::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The name was free and now belongs to the caller.
    Claimed,
    /// Another connection holds the name.
    AlreadyHeld,
}

/// Result of [`NameReservations::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The reservation belonged to the caller and was removed.
    Released,
    /// No reservation exists for the name.
    Missing,
    /// The name belongs to a different connection and was left alone.
    HeldBy(u64),
}

/// Claim, lookup and release of display names over a [`StorageBackend`].
pub struct NameReservations<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for NameReservations<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: ?Sized> std::fmt::Debug for NameReservations<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameReservations").finish_non_exhaustive()
    }
}

impl<S: StorageBackend + ?Sized> NameReservations<S> {
    /// Creates a reservation layer over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Reserves `name` for connection `id` if nobody holds it.
    ///
    /// # Errors
    ///
    /// Store failures other than the expected conflict are returned as-is.
    #[tracing::instrument(skip(self), fields(key = %reservation_key(name)))]
    pub async fn claim(&self, name: &str, id: u64) -> StorageResult<ClaimOutcome> {
        let key = reservation_key(name);
        match self.store.compare_and_set(key.as_bytes(), None, id.to_string().into_bytes()).await {
            Ok(()) => Ok(ClaimOutcome::Claimed),
            Err(StorageError::Conflict) => Ok(ClaimOutcome::AlreadyHeld),
            Err(e) => Err(e),
        }
    }

    /// The connection id currently holding `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the stored value is not a
    /// decimal connection id, and store failures as-is.
    pub async fn owner(&self, name: &str) -> StorageResult<Option<u64>> {
        let key = reservation_key(name);
        let Some(value) = self.store.get(key.as_bytes()).await? else {
            return Ok(None);
        };
        parse_owner(&key, &value).map(Some)
    }

    /// Releases `name` if and only if connection `id` holds it.
    ///
    /// # Errors
    ///
    /// Store failures and unparseable owner values are returned as errors.
    #[tracing::instrument(skip(self), fields(key = %reservation_key(name)))]
    pub async fn release(&self, name: &str, id: u64) -> StorageResult<ReleaseOutcome> {
        match self.owner(name).await? {
            None => return Ok(ReleaseOutcome::Missing),
            Some(owner) if owner != id => return Ok(ReleaseOutcome::HeldBy(owner)),
            Some(_) => {},
        }

        let key = reservation_key(name);
        match self.store.compare_and_delete(key.as_bytes(), id.to_string().as_bytes()).await {
            Ok(()) => Ok(ReleaseOutcome::Released),
            // Changed between the read and the delete: report what is there now.
            Err(StorageError::Conflict) => match self.owner(name).await? {
                None => Ok(ReleaseOutcome::Missing),
                Some(owner) => Ok(ReleaseOutcome::HeldBy(owner)),
            },
            Err(e) => Err(e),
        }
    }
}

fn parse_owner(key: &str, value: &[u8]) -> StorageResult<u64> {
    std::str::from_utf8(value).ok().and_then(|s| s.trim().parse::<u64>().ok()).ok_or_else(|| {
        StorageError::serialization(format!(
            "reservation {key:?} holds a non-numeric owner: {:?}",
            String::from_utf8_lossy(value)
        ))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use bytes::Bytes;
    use uniqname_storage::MemoryBackend;

    use super::*;

    fn reservations() -> (NameReservations<MemoryBackend>, MemoryBackend) {
        let backend = MemoryBackend::new();
        (NameReservations::new(Arc::new(backend.clone())), backend)
    }

    #[test]
    fn test_reservation_key_encoding() {
        assert_eq!(reservation_key("alice"), "UNIQUER/YWxpY2U=");
        assert_eq!(reservation_key(""), "UNIQUER/");
        assert_eq!(reservation_key("sensor-1"), "UNIQUER/c2Vuc29yLTE=");
    }

    #[tokio::test]
    async fn test_claim_then_conflict() {
        let (names, backend) = reservations();

        assert_eq!(names.claim("alice", 1).await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(names.claim("alice", 2).await.unwrap(), ClaimOutcome::AlreadyHeld);
        assert_eq!(names.owner("alice").await.unwrap(), Some(1));
        assert_eq!(backend.get(b"UNIQUER/YWxpY2U=").await.unwrap(), Some(Bytes::from("1")));
    }

    #[tokio::test]
    async fn test_same_connection_cannot_claim_twice() {
        let (names, _) = reservations();
        names.claim("alice", 1).await.unwrap();
        assert_eq!(names.claim("alice", 1).await.unwrap(), ClaimOutcome::AlreadyHeld);
    }

    #[tokio::test]
    async fn test_release_outcomes() {
        let (names, _) = reservations();

        assert_eq!(names.release("alice", 1).await.unwrap(), ReleaseOutcome::Missing);

        names.claim("alice", 1).await.unwrap();
        assert_eq!(names.release("alice", 2).await.unwrap(), ReleaseOutcome::HeldBy(1));
        assert_eq!(names.owner("alice").await.unwrap(), Some(1));

        assert_eq!(names.release("alice", 1).await.unwrap(), ReleaseOutcome::Released);
        assert_eq!(names.owner("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_u64_connection_ids() {
        let (names, _) = reservations();
        names.claim("big", u64::MAX).await.unwrap();
        assert_eq!(names.owner("big").await.unwrap(), Some(u64::MAX));
        assert_eq!(names.release("big", u64::MAX).await.unwrap(), ReleaseOutcome::Released);
    }

    #[tokio::test]
    async fn test_non_numeric_owner_is_serialization_error() {
        let (names, backend) = reservations();
        backend.set(reservation_key("alice").into_bytes(), b"not-a-number".to_vec()).await.unwrap();

        let err = names.owner("alice").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
        assert!(names.release("alice", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_release_after_reclaim_by_newer_connection() {
        let (names, _) = reservations();
        names.claim("x", 10).await.unwrap();
        names.release("x", 10).await.unwrap();
        names.claim("x", 11).await.unwrap();

        assert_eq!(names.release("x", 10).await.unwrap(), ReleaseOutcome::HeldBy(11));
        assert_eq!(names.owner("x").await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn test_works_through_trait_object() {
        let store: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let names = NameReservations::new(store);
        assert_eq!(names.claim("dyn", 3).await.unwrap(), ClaimOutcome::Claimed);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn distinct_names_have_distinct_keys(a in ".{0,32}", b in ".{0,32}") {
                prop_assume!(a != b);
                prop_assert_ne!(reservation_key(&a), reservation_key(&b));
            }

            #[test]
            fn keys_are_prefixed_base64(name in ".{0,64}") {
                let key = reservation_key(&name);
                let encoded = key.strip_prefix(KEY_PREFIX).expect("prefix");
                prop_assert_eq!(STANDARD.decode(encoded).expect("valid base64"), name.as_bytes());
            }
        }
    }
}

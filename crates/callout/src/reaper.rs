//! Releases display names when their connections go away.

use std::sync::Arc;

use uniqname_authn::AccountTable;
use uniqname_storage::StorageBackend;

use crate::{
    error::ReaperError,
    events::DisconnectEvent,
    reservation::{NameReservations, ReleaseOutcome, reservation_key},
};

/// What a disconnect event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// The account is not managed here; nothing was looked up.
    Unmanaged,
    /// The connection's reservation was deleted.
    Released,
    /// There was no reservation to delete.
    AlreadyReleased,
}

/// Consumes `$SYS.ACCOUNT.*.DISCONNECT` events.
///
/// Disconnects arrive at least once and in no particular order relative to
/// new connections, so a reservation is only removed while it still holds
/// the disconnecting connection's id.
pub struct DisconnectReaper<S: ?Sized> {
    accounts: Arc<AccountTable>,
    reservations: NameReservations<S>,
}

impl<S: ?Sized> Clone for DisconnectReaper<S> {
    fn clone(&self) -> Self {
        Self { accounts: Arc::clone(&self.accounts), reservations: self.reservations.clone() }
    }
}

impl<S: ?Sized> std::fmt::Debug for DisconnectReaper<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisconnectReaper").field("accounts", &self.accounts).finish_non_exhaustive()
    }
}

impl<S: StorageBackend + ?Sized> DisconnectReaper<S> {
    pub fn new(accounts: Arc<AccountTable>, store: Arc<S>) -> Self {
        Self { accounts, reservations: NameReservations::new(store) }
    }

    /// Decodes a raw event and reaps it.
    ///
    /// # Errors
    ///
    /// See [`reap`](Self::reap); additionally [`ReaperError::Decode`] for a
    /// payload that is not a disconnect event.
    pub async fn handle(&self, payload: &[u8]) -> Result<ReapOutcome, ReaperError> {
        let event: DisconnectEvent = serde_json::from_slice(payload)?;
        self.reap(&event).await
    }

    /// Releases the event client's name if that client still holds it.
    ///
    /// # Errors
    ///
    /// [`ReaperError::OwnerMismatch`] when a newer connection holds the name
    /// (left untouched), [`ReaperError::Storage`] on store failure.
    #[tracing::instrument(
        skip_all,
        fields(account = %event.client.account, name = %event.client.name, client_id = event.client.id)
    )]
    pub async fn reap(&self, event: &DisconnectEvent) -> Result<ReapOutcome, ReaperError> {
        let client = &event.client;
        if !self.accounts.is_managed(&client.account) {
            return Ok(ReapOutcome::Unmanaged);
        }

        match self.reservations.release(&client.name, client.id).await? {
            ReleaseOutcome::Released => {
                tracing::debug!("Released display name");
                Ok(ReapOutcome::Released)
            },
            ReleaseOutcome::Missing => {
                tracing::debug!("No reservation to release");
                Ok(ReapOutcome::AlreadyReleased)
            },
            ReleaseOutcome::HeldBy(stored) => Err(ReaperError::OwnerMismatch {
                key: reservation_key(&client.name),
                stored,
                disconnected: client.id,
            }),
        }
    }
}

//! Service lifecycle: connect, subscribe, dispatch, shut down.
//!
//! Startup acquires, in order, the signing key, the reservation store and
//! the NATS connection, then registers two queue subscriptions so that each
//! event reaches exactly one running instance:
//!
//! | Subject                      | Handler                  |
//! |------------------------------|--------------------------|
//! | `$SYS.REQ.USER.AUTH`         | [`AuthCalloutHandler`]   |
//! | `$SYS.ACCOUNT.*.DISCONNECT`  | [`DisconnectReaper`]     |
//!
//! Any failure up to that point is fatal. Afterwards every message runs on
//! its own task and failures stay with that message.
//!
//! Shutdown is triggered by the [`CancellationToken`] passed to
//! [`Service::start`] (or [`ServiceHandle::stop`]). Subscriptions are
//! removed in reverse order, in-flight handlers are given
//! `nats.drain_timeout` to finish, pending replies are flushed, and the
//! connections are released.

use std::sync::Arc;

use async_nats::{Client, Message, Subscriber};
use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use uniqname_authn::Signer;
use uniqname_storage::{HealthProbe, StorageBackend, StorageError};
use uniqname_storage_redis::RedisBackend;

use crate::{
    config::{NatsConfig, ServiceConfig},
    error::{CalloutError, ReaperError, ServiceError},
    handler::AuthCalloutHandler,
    reaper::{DisconnectReaper, ReapOutcome},
};

/// Subject of auth callout requests.
pub const AUTH_SUBJECT: &str = "$SYS.REQ.USER.AUTH";

/// Subject of client disconnect advisories, across all accounts.
pub const DISCONNECT_SUBJECT: &str = "$SYS.ACCOUNT.*.DISCONNECT";

/// Entry point for running the callout.
#[derive(Debug)]
pub struct Service;

/// A running service.
#[derive(Debug)]
pub struct ServiceHandle {
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), ServiceError>>,
}

impl ServiceHandle {
    /// Requests shutdown. Returns immediately; use [`wait`](Self::wait) to
    /// block until teardown completes.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Waits until the service has shut down.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::SubscriptionClosed`] if the service stopped because
    ///   a subscription ended rather than on request
    /// - [`ServiceError::Join`] if the service task panicked
    pub async fn wait(self) -> Result<(), ServiceError> {
        self.task.await?
    }
}

impl Service {
    /// Starts the service against the Redis store named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed is invalid, or the store or the bus
    /// cannot be reached.
    pub async fn start(config: ServiceConfig, shutdown: CancellationToken) -> Result<ServiceHandle, ServiceError> {
        let signer = Signer::from_seed(&config.seed).map_err(ServiceError::Seed)?;
        let store = RedisBackend::new(config.redis.clone())
            .await
            .map_err(|e| ServiceError::StoreConnect(e.into()))?;
        Self::run(config, signer, Arc::new(store), shutdown).await
    }

    /// Starts the service against an already constructed store.
    ///
    /// # Errors
    ///
    /// As for [`start`](Self::start), except that no store connection is made.
    pub async fn start_with_store(
        config: ServiceConfig,
        store: Arc<dyn StorageBackend>,
        shutdown: CancellationToken,
    ) -> Result<ServiceHandle, ServiceError> {
        let signer = Signer::from_seed(&config.seed).map_err(ServiceError::Seed)?;
        Self::run(config, signer, store, shutdown).await
    }

    async fn run(
        config: ServiceConfig,
        signer: Signer,
        store: Arc<dyn StorageBackend>,
        shutdown: CancellationToken,
    ) -> Result<ServiceHandle, ServiceError> {
        tracing::info!(issuer = signer.public_key(), "Loaded callout signing key");

        check_store(store.as_ref()).await?;

        let ServiceConfig { nats, accounts, .. } = config;
        let client = connect(&nats).await?;
        let group = nats.queue_group.clone();
        let auth = subscribe(&client, AUTH_SUBJECT, &group).await?;
        let disc = subscribe(&client, DISCONNECT_SUBJECT, &group).await?;
        tracing::info!(queue_group = %group, "Listening for auth callout requests and disconnects");

        let accounts = Arc::new(accounts);
        let dispatcher = Dispatcher {
            client,
            handler: AuthCalloutHandler::new(Arc::clone(&accounts), Arc::clone(&store), Arc::new(signer)),
            reaper: DisconnectReaper::new(accounts, Arc::clone(&store)),
            tracker: TaskTracker::new(),
        };

        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = dispatcher.serve(auth, disc, &token, &nats).await;
            drop(store);
            token.cancel();
            tracing::info!("Service stopped");
            result
        });

        Ok(ServiceHandle { shutdown, task })
    }
}

async fn check_store(store: &dyn StorageBackend) -> Result<(), ServiceError> {
    let status = store.health_check(HealthProbe::Liveness).await.map_err(ServiceError::StoreHealthCheck)?;
    if !status.is_healthy() {
        return Err(ServiceError::StoreUnhealthy(status.reason().unwrap_or("unknown").to_owned()));
    }
    tracing::info!(
        backend = %status.metadata().backend,
        duration_ms = status.metadata().check_duration.as_millis(),
        "Reservation store is live"
    );
    Ok(())
}

async fn connect(config: &NatsConfig) -> Result<Client, ServiceError> {
    let servers = config.server_addrs()?;
    let delays = config.clone();

    let client = async_nats::ConnectOptions::new()
        .user_and_password(config.user.clone(), config.password.as_str().to_owned())
        .name(&config.name)
        .max_reconnects(config.max_reconnects)
        .reconnect_delay_callback(move |attempts| delays.reconnect_delay(attempts))
        .connection_timeout(config.connection_timeout)
        .ping_interval(config.ping_interval)
        .subscription_capacity(config.subscription_capacity)
        .client_capacity(config.client_capacity)
        .event_callback(|event| async move {
            match event {
                async_nats::Event::Connected => tracing::info!(%event, "NATS connection event"),
                _ => tracing::warn!(%event, "NATS connection event"),
            }
        })
        .connect(servers.as_slice())
        .await?;

    tracing::info!(servers = ?config.servers, name = %config.name, "Connected to NATS");
    Ok(client)
}

async fn subscribe(client: &Client, subject: &str, group: &str) -> Result<Subscriber, ServiceError> {
    client
        .queue_subscribe(subject.to_owned(), group.to_owned())
        .await
        .map_err(|source| ServiceError::Subscribe { subject: subject.to_owned(), source })
}

struct Dispatcher {
    client: Client,
    handler: AuthCalloutHandler<dyn StorageBackend>,
    reaper: DisconnectReaper<dyn StorageBackend>,
    tracker: TaskTracker,
}

/// What the serve loop should do next.
#[derive(Debug, PartialEq, Eq)]
enum Incoming<T> {
    Auth(T),
    Disconnect(T),
    Shutdown,
}

/// Waits for the next message on either subscription, or for shutdown.
///
/// A subscription that ends while the service is running is an error: the
/// callout would otherwise stop answering while the process stays up.
async fn next_incoming<A, D, T>(
    auth: &mut A,
    disc: &mut D,
    shutdown: &CancellationToken,
) -> Result<Incoming<T>, ServiceError>
where
    A: Stream<Item = T> + Unpin,
    D: Stream<Item = T> + Unpin,
{
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Ok(Incoming::Shutdown),
        message = auth.next() => message
            .map(Incoming::Auth)
            .ok_or_else(|| ServiceError::SubscriptionClosed { subject: AUTH_SUBJECT.to_owned() }),
        message = disc.next() => message
            .map(Incoming::Disconnect)
            .ok_or_else(|| ServiceError::SubscriptionClosed { subject: DISCONNECT_SUBJECT.to_owned() }),
    }
}

impl Dispatcher {
    async fn serve(
        self,
        mut auth: Subscriber,
        mut disc: Subscriber,
        shutdown: &CancellationToken,
        config: &NatsConfig,
    ) -> Result<(), ServiceError> {
        let result = loop {
            match next_incoming(&mut auth, &mut disc, shutdown).await {
                Ok(Incoming::Auth(message)) => self.dispatch_auth(message),
                Ok(Incoming::Disconnect(message)) => self.dispatch_disconnect(message),
                Ok(Incoming::Shutdown) => break Ok(()),
                Err(error) => {
                    tracing::error!(%error, "Stopping after subscription loss");
                    break Err(error);
                },
            }
        };

        tracing::info!("Shutting down");
        if let Err(error) = disc.unsubscribe().await {
            tracing::warn!(%error, subject = DISCONNECT_SUBJECT, "Failed to unsubscribe");
        }
        if let Err(error) = auth.unsubscribe().await {
            tracing::warn!(%error, subject = AUTH_SUBJECT, "Failed to unsubscribe");
        }

        self.tracker.close();
        if tokio::time::timeout(config.drain_timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                in_flight = self.tracker.len(),
                timeout = ?config.drain_timeout,
                "Gave up waiting for in-flight handlers"
            );
        }

        match tokio::time::timeout(config.flush_timeout, self.client.flush()).await {
            Ok(Ok(())) => {},
            Ok(Err(error)) => tracing::warn!(%error, "Failed to flush NATS connection"),
            Err(_) => tracing::warn!(timeout = ?config.flush_timeout, "Timed out flushing NATS connection"),
        }

        result
    }

    fn dispatch_auth(&self, message: Message) {
        let handler = self.handler.clone();
        let client = self.client.clone();

        self.tracker.spawn(async move {
            let Some(reply) = message.reply else {
                tracing::warn!(subject = %message.subject, "Authorization request without a reply subject");
                return;
            };

            let publish = |response| async move { client.publish(reply, response).await };
            match handler.respond(&message.payload, publish).await {
                Ok(()) => {},
                Err(error @ CalloutError::Publish(_)) => {
                    tracing::error!(%error, "Failed to publish authorization response");
                },
                Err(error) if error.is_protocol_error() => {
                    tracing::warn!(%error, "Dropped authorization request");
                },
                Err(CalloutError::Storage(error)) if error.is_transient() => {
                    tracing::warn!(%error, "Reservation store unavailable, request dropped");
                },
                Err(error) => tracing::error!(%error, "Failed to answer authorization request"),
            }
        });
    }

    fn dispatch_disconnect(&self, message: Message) {
        let reaper = self.reaper.clone();

        self.tracker.spawn(async move {
            match reaper.handle(&message.payload).await {
                Ok(ReapOutcome::Released | ReapOutcome::Unmanaged) => {},
                Ok(ReapOutcome::AlreadyReleased) => {
                    tracing::debug!(subject = %message.subject, "Disconnect for a name that was not reserved");
                },
                Err(error @ ReaperError::OwnerMismatch { .. }) => tracing::info!(%error, "Ignored stale disconnect"),
                Err(error @ ReaperError::Storage(StorageError::Serialization { .. })) => {
                    tracing::error!(%error, "Corrupt reservation");
                },
                Err(error) => tracing::warn!(%error, subject = %message.subject, "Failed to process disconnect"),
            }
        });
    }
}

//! # uniqname callout
//!
//! A NATS auth callout service that admits a client only if no other
//! connected client, on any server of the cluster, uses the same display
//! name.
//!
//! - [`handler`] answers `$SYS.REQ.USER.AUTH`: it checks the request
//!   envelope, authenticates against the managed [`AccountTable`], claims the
//!   client's name in the shared store and replies with a signed grant or
//!   denial.
//! - [`reaper`] consumes `$SYS.ACCOUNT.*.DISCONNECT` and releases a name
//!   while it still belongs to the disconnecting connection.
//! - [`reservation`] is the name-to-connection mapping both sides share.
//! - [`service`] wires them to a NATS connection and a Redis store.
//!
//! Any number of instances may run side by side; the store's atomic
//! insert-if-absent decides every race.
//!
//! ## Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use uniqname_callout::{Service, ServiceConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::load("uniqname.toml")?;
//! let shutdown = CancellationToken::new();
//! let service = Service::start(config, shutdown.clone()).await?;
//!
//! // ... later
//! shutdown.cancel();
//! service.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`AccountTable`]: uniqname_authn::AccountTable

#![deny(unsafe_code)]

pub mod config;
pub mod decision;
pub mod error;
pub mod events;
pub mod handler;
pub mod reaper;
pub mod reservation;
pub mod service;

pub use config::{ConfigError, NatsConfig, ServiceConfig};
pub use decision::Decision;
pub use error::{CalloutError, ReaperError, ServiceError};
pub use events::DisconnectEvent;
pub use handler::AuthCalloutHandler;
pub use reaper::{DisconnectReaper, ReapOutcome};
pub use reservation::{ClaimOutcome, NameReservations, ReleaseOutcome, reservation_key};
pub use service::{Service, ServiceHandle};

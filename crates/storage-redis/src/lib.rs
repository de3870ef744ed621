//! Redis-backed implementation of [`StorageBackend`](uniqname_storage::StorageBackend).
//!
//! This crate provides [`RedisBackend`], the production reservation store.
//! Every service instance in a deployment points at the same Redis-protocol
//! store, which is what makes a display-name reservation cluster-wide.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   NameReservations                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   RedisBackend                              │
//! │         (implements StorageBackend trait)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   redis::aio::ConnectionManager             │
//! │      multiplexed connection │ automatic reconnect           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Redis / Valkey / KeyDB                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Atomicity
//!
//! | Operation | Command |
//! |-----------|---------|
//! | `get` | `GET` |
//! | `set` | `SET` |
//! | `compare_and_set(None)` | `SET NX` |
//! | `compare_and_set(Some)` | Lua compare-then-`SET` |
//! | `compare_and_delete` | Lua compare-then-`DEL` |
//! | `delete` | `DEL` |
//! | `health_check` | `PING` |
//!
//! No key is ever written with an expiry.
//!
//! # Quick Start
//!
//! ```no_run
//! use uniqname_storage::StorageBackend;
//! use uniqname_storage_redis::{RedisBackend, RedisBackendConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisBackendConfig::builder().address("localhost:6379").build()?;
//!     let backend = RedisBackend::new(config).await?;
//!
//!     backend.compare_and_set(b"UNIQUER/Ym9i", None, b"9".to_vec()).await?;
//!     backend.compare_and_delete(b"UNIQUER/Ym9i", b"9").await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod error;

pub use backend::RedisBackend;
pub use config::RedisBackendConfig;
pub use error::{RedisStorageError, Result};

//! Atomic single-key storage for client name reservations.
//!
//! This crate provides the [`StorageBackend`] trait: the complete contract
//! between the name reservation layer and the shared key-value store. It is
//! deliberately small (point read, unconditional write, conditional write,
//! conditional delete, delete, health probe) and every operation touches a
//! single key.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │     Auth callout handler        Disconnect reaper           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 NameReservations                            │
//! │      (claim / owner / release, key encoding)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 uniqname-storage                            │
//! │               StorageBackend trait                          │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ MemoryBackend│            RedisBackend                      │
//! │   (testing)  │          (production)                        │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use uniqname_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     // Claim a key; a second claim would fail with StorageError::Conflict.
//!     backend.compare_and_set(b"UNIQUER/YWxpY2U=", None, b"17".to_vec()).await?;
//!
//!     // Release it only if it is still held by the same owner.
//!     backend.compare_and_delete(b"UNIQUER/YWxpY2U=", b"17").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the [`testutil`] helpers and the [`conformance`] suite.
//! - **`failpoints`**: Activates `fail` points in [`MemoryBackend`] for error-injection tests.

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod health;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use backend::StorageBackend;
pub use error::{BoxError, StorageError, StorageResult};
pub use health::{HealthMetadata, HealthProbe, HealthStatus};
pub use memory::{MemoryBackend, OpCounts};

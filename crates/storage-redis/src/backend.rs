//! Redis-backed storage backend implementation.
//!
//! This module provides [`RedisBackend`], which implements the
//! [`StorageBackend`](uniqname_storage::StorageBackend) trait over a
//! multiplexed, auto-reconnecting connection to a Redis-protocol store.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use redis::{
    Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use uniqname_storage::{
    HealthMetadata, HealthProbe, HealthStatus, StorageBackend, StorageError, StorageResult,
};

use crate::{
    config::RedisBackendConfig,
    error::{RedisStorageError, Result},
};

/// Replaces the value only when the current value equals `ARGV[1]`.
const COMPARE_AND_SET_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
";

/// Deletes the key only when the current value equals `ARGV[1]`.
const COMPARE_AND_DELETE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Redis-backed implementation of [`StorageBackend`].
///
/// Every operation is a single command or a single server-side script, so
/// conditional writes are atomic on the server regardless of how many
/// service instances share the store. Values are written without expiry.
///
/// # Thread Safety
///
/// `RedisBackend` is `Send + Sync` and cheap to clone. Clones share one
/// multiplexed connection which reconnects on its own after failures.
///
/// # Example
///
/// ```no_run
/// use uniqname_storage::StorageBackend;
/// use uniqname_storage_redis::{RedisBackend, RedisBackendConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = RedisBackendConfig::builder().address("localhost:6379").build()?;
///     let backend = RedisBackend::new(config).await?;
///
///     backend.compare_and_set(b"UNIQUER/YWxpY2U=", None, b"42".to_vec()).await?;
///     let owner = backend.get(b"UNIQUER/YWxpY2U=").await?;
///     assert_eq!(owner, Some(bytes::Bytes::from("42")));
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    /// Multiplexed connection shared by every clone.
    conn: ConnectionManager,

    /// Address the backend was configured with, for diagnostics.
    address: String,

    /// Wire protocol in use.
    protocol: u8,

    compare_and_set: Script,
    compare_and_delete: Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Creates a new Redis backend and establishes its connection.
    ///
    /// The connection is opened eagerly, so an unreachable store fails here
    /// rather than on the first request.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration is invalid
    /// - Unable to connect to the store within `connect_timeout`
    pub async fn new(config: RedisBackendConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::open(config.connection_info()?)?;
        // The manager retries failed connects with backoff; startup must not.
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(config.connect_timeout())
            .set_response_timeout(config.response_timeout());
        let conn = tokio::time::timeout(
            config.connect_timeout(),
            ConnectionManager::new_with_config(client, manager_config),
        )
        .await
        .map_err(|_| RedisStorageError::ConnectTimeout(config.connect_timeout()))??;

        tracing::debug!(
            address = %config.address(),
            protocol = config.protocol(),
            database = config.database(),
            "Connected to reservation store"
        );

        Ok(Self {
            conn,
            address: config.address().to_owned(),
            protocol: config.protocol(),
            compare_and_set: Script::new(COMPARE_AND_SET_SCRIPT),
            compare_and_delete: Script::new(COMPARE_AND_DELETE_SCRIPT),
        })
    }

    /// Returns the address this backend was configured with.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

fn map_err(err: redis::RedisError) -> StorageError {
    StorageError::from(RedisStorageError::from(err))
}

#[async_trait]
impl StorageBackend for RedisBackend {
    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> =
            redis::cmd("GET").arg(key).query_async(&mut conn).await.map_err(map_err)?;
        Ok(value.map(Bytes::from))
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(&key)))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _: () =
            redis::cmd("SET").arg(&key).arg(&value).query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        new_value: Vec<u8>,
    ) -> StorageResult<()> {
        let mut conn = self.conn.clone();

        match expected {
            None => {
                // SET NX replies OK when written and nil when the key exists.
                let reply: Option<String> = redis::cmd("SET")
                    .arg(key)
                    .arg(&new_value)
                    .arg("NX")
                    .query_async(&mut conn)
                    .await
                    .map_err(map_err)?;

                match reply {
                    Some(_) => Ok(()),
                    None => Err(StorageError::conflict()),
                }
            },
            Some(expected) => {
                let replaced: i64 = self
                    .compare_and_set
                    .key(key)
                    .arg(expected)
                    .arg(&new_value)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(map_err)?;

                if replaced == 1 { Ok(()) } else { Err(StorageError::conflict()) }
            },
        }
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn compare_and_delete(&self, key: &[u8], expected: &[u8]) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        if deleted == 1 { Ok(()) } else { Err(StorageError::conflict()) }
    }

    #[tracing::instrument(skip_all, fields(key = %String::from_utf8_lossy(key)))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _removed: i64 =
            redis::cmd("DEL").arg(key).query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn health_check(&self, probe: HealthProbe) -> StorageResult<HealthStatus> {
        let start = Instant::now();
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await.map_err(map_err)?;

        let metadata = HealthMetadata::new(start.elapsed(), "redis")
            .with_detail("address", self.address.clone())
            .with_detail("protocol", self.protocol.to_string())
            .with_detail("probe", format!("{probe:?}").to_lowercase());

        if reply.eq_ignore_ascii_case("PONG") {
            Ok(HealthStatus::healthy(metadata))
        } else {
            Ok(HealthStatus::unhealthy(metadata, format!("unexpected PING reply: {reply}")))
        }
    }
}

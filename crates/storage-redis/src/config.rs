//! Configuration for the Redis storage backend.
//!
//! This module provides [`RedisBackendConfig`] which describes how to reach
//! the shared reservation store.

use std::{fmt, time::Duration};

use redis::{ConnectionAddr, ConnectionInfo, ProtocolVersion, RedisConnectionInfo};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{RedisStorageError, Result};

/// Default store address.
const DEFAULT_ADDRESS: &str = "redis:6379";

/// Default port used when the address omits one.
const DEFAULT_PORT: u16 = 6379;

/// Default wire protocol (RESP2).
const DEFAULT_PROTOCOL: u8 = 2;

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-command response timeout (5 seconds).
const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`RedisBackend`](crate::RedisBackend).
///
/// # Example
///
/// ```no_run
/// use uniqname_storage_redis::RedisBackendConfig;
///
/// let config = RedisBackendConfig::builder()
///     .address("localhost:6379")
///     .protocol(3)
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisBackendConfig {
    /// `host:port` of the store.
    #[serde(default = "default_address")]
    pub(crate) address: String,

    /// Wire protocol version, 2 (RESP2) or 3 (RESP3).
    #[serde(default = "default_protocol")]
    pub(crate) protocol: u8,

    /// Logical database index.
    #[serde(default)]
    pub(crate) database: i64,

    /// ACL username, if the store requires one.
    #[serde(default)]
    pub(crate) username: Option<String>,

    /// ACL password, if the store requires one.
    #[serde(default, skip_serializing)]
    pub(crate) password: Option<Zeroizing<String>>,

    /// Connection timeout.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub(crate) connect_timeout: Duration,

    /// Per-command response timeout.
    #[serde(with = "humantime_serde", default = "default_response_timeout")]
    pub(crate) response_timeout: Duration,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_owned()
}

fn default_protocol() -> u8 {
    DEFAULT_PROTOCOL
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_response_timeout() -> Duration {
    DEFAULT_RESPONSE_TIMEOUT
}

impl Default for RedisBackendConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            protocol: DEFAULT_PROTOCOL,
            database: 0,
            username: None,
            password: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

impl fmt::Debug for RedisBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackendConfig")
            .field("address", &self.address)
            .field("protocol", &self.protocol)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

#[bon::bon]
impl RedisBackendConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Optional Fields
    ///
    /// * `address` - `host:port` of the store (default: `redis:6379`).
    /// * `protocol` - 2 or 3 (default: 2).
    /// * `database` - Logical database index (default: 0).
    /// * `username` / `password` - ACL credentials.
    /// * `connect_timeout` - Connection timeout (default: 5 seconds).
    /// * `response_timeout` - Per-command timeout (default: 5 seconds).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address is empty or has an unparseable port
    /// - The protocol is neither 2 nor 3
    /// - The database index is negative
    #[builder]
    pub fn new(
        #[builder(into, default = DEFAULT_ADDRESS.to_owned())] address: String,
        #[builder(default = DEFAULT_PROTOCOL)] protocol: u8,
        #[builder(default)] database: i64,
        #[builder(into)] username: Option<String>,
        #[builder(with = |password: impl Into<String>| Zeroizing::new(password.into()))]
        password: Option<Zeroizing<String>>,
        #[builder(default = DEFAULT_CONNECT_TIMEOUT)] connect_timeout: Duration,
        #[builder(default = DEFAULT_RESPONSE_TIMEOUT)] response_timeout: Duration,
    ) -> Result<Self> {
        let config = Self {
            address,
            protocol,
            database,
            username,
            password,
            connect_timeout,
            response_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks a configuration that was deserialized rather than built.
    ///
    /// # Errors
    ///
    /// Returns [`RedisStorageError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        split_address(&self.address)?;

        if !matches!(self.protocol, 2 | 3) {
            return Err(RedisStorageError::Config(format!(
                "protocol must be 2 or 3, got {}",
                self.protocol
            )));
        }

        if self.database < 0 {
            return Err(RedisStorageError::Config("database index cannot be negative".into()));
        }

        Ok(())
    }

    /// Returns the configured address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the configured protocol version.
    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Returns the logical database index.
    #[must_use]
    pub fn database(&self) -> i64 {
        self.database
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the per-command response timeout.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Builds the client connection descriptor from this config.
    pub(crate) fn connection_info(&self) -> Result<ConnectionInfo> {
        let (host, port) = split_address(&self.address)?;
        let protocol =
            if self.protocol == 3 { ProtocolVersion::RESP3 } else { ProtocolVersion::RESP2 };

        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_owned(), port),
            redis: RedisConnectionInfo {
                db: self.database,
                username: self.username.clone(),
                password: self.password.as_ref().map(|p| p.as_str().to_owned()),
                protocol,
            },
        })
    }
}

/// Splits `host[:port]` into its parts, defaulting the port.
fn split_address(address: &str) -> Result<(&str, u16)> {
    let address = address.trim();
    if address.is_empty() {
        return Err(RedisStorageError::Config("address cannot be empty".into()));
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                RedisStorageError::Config(format!("invalid port in address: {address}"))
            })?;
            Ok((host, port))
        },
        Some(_) => Err(RedisStorageError::Config(format!("missing host in address: {address}"))),
        None => Ok((address, DEFAULT_PORT)),
    }
}

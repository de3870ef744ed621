//! Service configuration.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! seed = "SAAGYA5HIPHPB2NZTTZTF5BGX6YNLGLMXIYPUPNJPIN7Z4QQSTCGT3NFRY"
//!
//! [nats]
//! servers = ["nats:4222"]
//! user = "admin"
//! password = "password"
//!
//! [redis]
//! address = "redis:6379"
//! protocol = 2
//!
//! [accounts.APP]
//! staff = "password"
//! ```
//!
//! Any bus option left out, or set to zero, takes its default.

use std::{fmt, path::Path, time::Duration};

use async_nats::ServerAddr;
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use uniqname_authn::AccountTable;
use uniqname_storage_redis::{RedisBackendConfig, RedisStorageError};
use zeroize::Zeroizing;

const DEFAULT_SERVER: &str = "nats:4222";
const DEFAULT_NAME: &str = "UNIQUER";
const DEFAULT_QUEUE_GROUP: &str = "UNIQUER";
const DEFAULT_MAX_RECONNECTS: usize = 60;
const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(2);
const DEFAULT_RECONNECT_JITTER: Duration = Duration::from_millis(100);
const DEFAULT_RECONNECT_JITTER_TLS: Duration = Duration::from_secs(1);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);
const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 65_536;
const DEFAULT_CLIENT_CAPACITY: usize = 2048;
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// The `[redis]` section is invalid.
    #[error("Invalid redis config: {0}")]
    Redis(#[from] RedisStorageError),
}

/// Connection options for the NATS client.
#[derive(Clone, Deserialize, bon::Builder)]
#[serde(default, deny_unknown_fields)]
pub struct NatsConfig {
    /// Server URLs, e.g. `nats:4222` or `tls://nats.internal:4222`.
    #[builder(default = vec![DEFAULT_SERVER.to_owned()])]
    pub servers: Vec<String>,

    /// Auth callout user, a member of the auth callout `auth_users`.
    #[builder(default, into)]
    pub user: String,

    #[builder(default, into)]
    pub password: Zeroizing<String>,

    /// Client connection name.
    #[builder(default = DEFAULT_NAME.to_owned(), into)]
    pub name: String,

    /// Queue group shared by every instance of the service.
    #[builder(default = DEFAULT_QUEUE_GROUP.to_owned(), into)]
    pub queue_group: String,

    #[builder(default = DEFAULT_MAX_RECONNECTS)]
    pub max_reconnects: usize,

    /// Base delay between reconnect attempts.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_RECONNECT_WAIT)]
    pub reconnect_wait: Duration,

    /// Upper bound of the random delay added to `reconnect_wait`.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_RECONNECT_JITTER)]
    pub reconnect_jitter: Duration,

    /// Jitter bound used instead when any server is `tls://`.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_RECONNECT_JITTER_TLS)]
    pub reconnect_jitter_tls: Duration,

    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_CONNECTION_TIMEOUT)]
    pub connection_timeout: Duration,

    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_PING_INTERVAL)]
    pub ping_interval: Duration,

    /// Messages buffered per subscription before the client applies backpressure.
    #[builder(default = DEFAULT_SUBSCRIPTION_CAPACITY)]
    pub subscription_capacity: usize,

    /// Outgoing command buffer of the client.
    #[builder(default = DEFAULT_CLIENT_CAPACITY)]
    pub client_capacity: usize,

    /// How long shutdown waits for in-flight handlers.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_DRAIN_TIMEOUT)]
    pub drain_timeout: Duration,

    /// How long shutdown waits for pending replies to be flushed.
    #[serde(with = "humantime_serde")]
    #[builder(default = DEFAULT_FLUSH_TIMEOUT)]
    pub flush_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for NatsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatsConfig")
            .field("servers", &self.servers)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("queue_group", &self.queue_group)
            .field("max_reconnects", &self.max_reconnects)
            .field("reconnect_wait", &self.reconnect_wait)
            .field("reconnect_jitter", &self.reconnect_jitter)
            .field("reconnect_jitter_tls", &self.reconnect_jitter_tls)
            .field("connection_timeout", &self.connection_timeout)
            .field("ping_interval", &self.ping_interval)
            .field("subscription_capacity", &self.subscription_capacity)
            .field("client_capacity", &self.client_capacity)
            .field("drain_timeout", &self.drain_timeout)
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}

fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

impl NatsConfig {
    /// Replaces every empty or zero option with its default.
    #[must_use]
    pub fn with_defaults(self) -> Self {
        let servers = if self.servers.is_empty() { vec![DEFAULT_SERVER.to_owned()] } else { self.servers };
        Self {
            servers,
            name: or_default(self.name, DEFAULT_NAME.to_owned()),
            queue_group: or_default(self.queue_group, DEFAULT_QUEUE_GROUP.to_owned()),
            max_reconnects: or_default(self.max_reconnects, DEFAULT_MAX_RECONNECTS),
            reconnect_wait: or_default(self.reconnect_wait, DEFAULT_RECONNECT_WAIT),
            reconnect_jitter: or_default(self.reconnect_jitter, DEFAULT_RECONNECT_JITTER),
            reconnect_jitter_tls: or_default(self.reconnect_jitter_tls, DEFAULT_RECONNECT_JITTER_TLS),
            connection_timeout: or_default(self.connection_timeout, DEFAULT_CONNECTION_TIMEOUT),
            ping_interval: or_default(self.ping_interval, DEFAULT_PING_INTERVAL),
            subscription_capacity: or_default(self.subscription_capacity, DEFAULT_SUBSCRIPTION_CAPACITY),
            client_capacity: or_default(self.client_capacity, DEFAULT_CLIENT_CAPACITY),
            drain_timeout: or_default(self.drain_timeout, DEFAULT_DRAIN_TIMEOUT),
            flush_timeout: or_default(self.flush_timeout, DEFAULT_FLUSH_TIMEOUT),
            ..self
        }
    }

    /// Parses the server list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first unparseable URL.
    pub fn server_addrs(&self) -> Result<Vec<ServerAddr>, ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid("nats.servers must not be empty".into()));
        }
        self.servers
            .iter()
            .map(|server| {
                server
                    .parse::<ServerAddr>()
                    .map_err(|e| ConfigError::Invalid(format!("nats server {server:?}: {e}")))
            })
            .collect()
    }

    /// Returns `true` if any server is reached over TLS.
    #[must_use]
    pub fn uses_tls(&self) -> bool {
        self.servers.iter().any(|server| server.starts_with("tls://"))
    }

    /// Delay before reconnect attempt number `attempts`.
    ///
    /// The first attempt is immediate. Later ones wait `reconnect_wait`
    /// plus a random jitter bounded by `reconnect_jitter`, or by
    /// `reconnect_jitter_tls` for TLS servers.
    #[must_use]
    pub fn reconnect_delay(&self, attempts: usize) -> Duration {
        if attempts <= 1 {
            return Duration::ZERO;
        }
        let bound = if self.uses_tls() { self.reconnect_jitter_tls } else { self.reconnect_jitter };
        let bound_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
        self.reconnect_wait + Duration::from_millis(rand::rng().random_range(0..=bound_ms))
    }
}

/// Complete configuration of one service instance.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub nats: NatsConfig,

    #[serde(default)]
    pub redis: RedisBackendConfig,

    /// Account seed (`SA...`) the callout signs with; its public key is the
    /// `issuer` in the server's `auth_callout` block.
    pub seed: Zeroizing<String>,

    /// Managed accounts: `[accounts.<ACCOUNT>] user = "password"`.
    #[serde(default)]
    pub accounts: AccountTable,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("nats", &self.nats)
            .field("redis", &self.redis)
            .field("seed", &"[REDACTED]")
            .field("accounts", &self.accounts)
            .finish()
    }
}

#[bon::bon]
impl ServiceConfig {
    /// Builds a configuration programmatically.
    ///
    /// # Errors
    ///
    /// Returns an error if the result fails [`validate`](Self::validate).
    #[builder]
    pub fn new(
        #[builder(default)] nats: NatsConfig,
        #[builder(default)] redis: RedisBackendConfig,
        #[builder(with = |seed: impl Into<String>| Zeroizing::new(seed.into()))] seed: Zeroizing<String>,
        #[builder(default)] accounts: AccountTable,
    ) -> Result<Self, ConfigError> {
        let config = Self { nats: nats.with_defaults(), redis, seed, accounts };
        config.validate()?;
        Ok(config)
    }
}

impl ServiceConfig {
    /// Reads, defaults and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_toml(&text)
    }

    /// Parses, defaults and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed or validated.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        let config = config.with_defaults();
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_defaults(self) -> Self {
        Self { nats: self.nats.with_defaults(), ..self }
    }

    /// Checks everything that can be checked without connecting.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seed.trim().is_empty() {
            return Err(ConfigError::Invalid("seed must be set".into()));
        }
        self.nats.server_addrs()?;
        self.redis.validate()?;
        if self.accounts.is_empty() {
            tracing::warn!("No managed accounts configured; every named login will fail");
        }
        Ok(())
    }
}

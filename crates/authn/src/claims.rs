//! NATS claim wire types.
//!
//! Every token on the auth callout path is a [`Claims`] envelope with a
//! claim-specific `nats` object:
//!
//! ```json
//! {
//!   "jti": "QFN3...",
//!   "iat": 1700000000,
//!   "iss": "NBSERVER...",
//!   "sub": "UAUSER...",
//!   "aud": "nats-authorization-request",
//!   "nats": { "type": "authorization_request", "version": 2, "...": "..." }
//! }
//! ```
//!
//! Field names follow the NATS JWT v2 JSON encoding. Empty strings, empty
//! lists and zero timestamps are omitted on output and defaulted on input.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use zeroize::Zeroizing;

/// Claim format version written into every `nats` object.
pub const CLAIMS_VERSION: u32 = 2;

/// Audience every authorization request must carry.
pub const AUTHORIZATION_REQUEST_AUDIENCE: &str = "nats-authorization-request";

/// A claim kind that can travel inside a [`Claims`] envelope.
pub trait NatsClaim: Serialize + DeserializeOwned {
    /// Value of the `nats.type` field for this claim kind.
    const CLAIM_TYPE: &'static str;

    /// The `nats.type` value carried by this instance.
    fn claim_type(&self) -> &str;
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

fn default_version() -> u32 {
    CLAIMS_VERSION
}

/// Registered JWT fields shared by every claim kind.
///
/// This is also the exact input of the `jti` digest, which deliberately
/// leaves the `nats` object out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsData {
    /// Token identifier derived from the other envelope fields.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jti: String,
    /// Issued at, seconds since the epoch.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub iat: i64,
    /// Public nkey of the signer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iss: String,
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Subject of the claim.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub: String,
    /// Intended audience.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aud: String,
    /// Expiry, seconds since the epoch, 0 for none.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub exp: i64,
    /// Not valid before, seconds since the epoch, 0 for none.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub nbf: i64,
}

/// A claims envelope carrying the claim-specific `nats` object `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims<T> {
    /// Registered fields.
    #[serde(flatten)]
    pub data: ClaimsData,
    /// Claim-specific payload.
    pub nats: T,
}

impl<T: NatsClaim> Claims<T> {
    /// Creates an unsigned envelope for `subject` and `audience`.
    ///
    /// `jti`, `iat` and `iss` are filled in when the claims are encoded.
    pub fn new(subject: impl Into<String>, audience: impl Into<String>, nats: T) -> Self {
        Self {
            data: ClaimsData { sub: subject.into(), aud: audience.into(), ..ClaimsData::default() },
            nats,
        }
    }
}

// ============================================================================
// Authorization request
// ============================================================================

/// The `nats` object of an authorization request, sent by a server for
/// every client connection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Identity of the server asking.
    pub server_id: ServerId,
    /// Public nkey minted by the server for this connection; the subject of
    /// the reply and of any user token.
    #[serde(default)]
    pub user_nkey: String,
    /// What the server knows about the client.
    #[serde(default)]
    pub client_info: ClientInformation,
    /// Options the client sent in its CONNECT.
    #[serde(default)]
    pub connect_opts: ConnectOptions,
    /// TLS details, when the client connected over TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_tls: Option<ClientTls>,
    /// Nonce sent to the client, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_nonce: String,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Always `authorization_request`.
    #[serde(rename = "type", default)]
    pub claim_type: String,
    /// Claim format version.
    #[serde(default = "default_version")]
    pub version: u32,
}

impl NatsClaim for AuthorizationRequest {
    const CLAIM_TYPE: &'static str = "authorization_request";

    fn claim_type(&self) -> &str {
        &self.claim_type
    }
}

impl AuthorizationRequest {
    /// Creates a request for `user_nkey` issued by `server_id`.
    pub fn new(server_id: ServerId, user_nkey: impl Into<String>) -> Self {
        Self {
            server_id,
            user_nkey: user_nkey.into(),
            client_info: ClientInformation::default(),
            connect_opts: ConnectOptions::default(),
            client_tls: None,
            request_nonce: String::new(),
            tags: Vec::new(),
            claim_type: Self::CLAIM_TYPE.to_owned(),
            version: CLAIMS_VERSION,
        }
    }
}

/// Identity of a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerId {
    /// Configured server name.
    #[serde(default)]
    pub name: String,
    /// Host the server runs on.
    #[serde(default)]
    pub host: String,
    /// Server public nkey (`N...`).
    #[serde(default)]
    pub id: String,
    /// Server version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Cluster name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    /// Server tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Curve key for encrypted callouts.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub xkey: String,
}

/// Client information assigned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInformation {
    /// Remote host.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    /// Connection id, unique per server.
    #[serde(default)]
    pub id: u64,
    /// User the client authenticated as, if known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Display name the client declared.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Client tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Name tag.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name_tag: String,
    /// Connection kind (`Client`, `Leafnode`, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Client type (`nats`, `mqtt`, `websocket`).
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub client_type: String,
    /// MQTT client id.
    #[serde(rename = "mqtt_id", default, skip_serializing_if = "String::is_empty")]
    pub mqtt_client_id: String,
    /// Nonce presented to the client.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
}

/// Options from the client's CONNECT.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// User JWT, for decentralized auth.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jwt: String,
    /// Client public nkey.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nkey: String,
    /// Signed nonce.
    #[serde(rename = "sig", default, skip_serializing_if = "String::is_empty")]
    pub signed_nonce: String,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "is_empty_secret")]
    pub auth_token: Zeroizing<String>,
    /// Username.
    #[serde(rename = "user", default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Password.
    #[serde(rename = "pass", default, skip_serializing_if = "is_empty_secret")]
    pub password: Zeroizing<String>,
    /// Client-declared name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Client library language.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub lang: String,
    /// Client library version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Protocol level.
    #[serde(default)]
    pub protocol: i32,
}

fn is_empty_secret(value: &Zeroizing<String>) -> bool {
    value.is_empty()
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Zeroizing<String>| if secret.is_empty() { "" } else { "[REDACTED]" };
        f.debug_struct("ConnectOptions")
            .field("nkey", &self.nkey)
            .field("auth_token", &redact(&self.auth_token))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("name", &self.name)
            .field("lang", &self.lang)
            .field("version", &self.version)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// TLS details of the client connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTls {
    /// Negotiated TLS version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Negotiated cipher suite.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cipher: String,
    /// PEM-encoded peer certificates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certs: Vec<String>,
    /// Verified chains, PEM-encoded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verified_chains: Vec<Vec<String>>,
}

// ============================================================================
// Authorization response
// ============================================================================

/// The `nats` object of the reply to an authorization request.
///
/// Exactly one of `jwt` (grant) or `error` (denial) is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    /// Signed user token on grant.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub jwt: String,
    /// Denial reason.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Issuing account, in operator mode only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer_account: String,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Always `authorization_response`.
    #[serde(rename = "type", default)]
    pub claim_type: String,
    /// Claim format version.
    #[serde(default = "default_version")]
    pub version: u32,
}

impl NatsClaim for AuthorizationResponse {
    const CLAIM_TYPE: &'static str = "authorization_response";

    fn claim_type(&self) -> &str {
        &self.claim_type
    }
}

impl AuthorizationResponse {
    /// A grant carrying a signed user token.
    pub fn granted(jwt: impl Into<String>) -> Self {
        Self { jwt: jwt.into(), ..Self::empty() }
    }

    /// A denial carrying a human-readable reason.
    pub fn denied(error: impl Into<String>) -> Self {
        Self { error: error.into(), ..Self::empty() }
    }

    fn empty() -> Self {
        Self {
            jwt: String::new(),
            error: String::new(),
            issuer_account: String::new(),
            tags: Vec::new(),
            claim_type: Self::CLAIM_TYPE.to_owned(),
            version: CLAIMS_VERSION,
        }
    }
}

// ============================================================================
// User
// ============================================================================

/// Subjects a user may or may not use. Empty lists impose no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Allowed subjects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    /// Denied subjects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

/// The `nats` object of a user token.
///
/// Tokens minted by the callout carry no permission restrictions and
/// unlimited (`-1`) limits; the account the token is scoped to governs
/// what the client can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Publish permissions.
    #[serde(rename = "pub", default)]
    pub publish: Permission,
    /// Subscribe permissions.
    #[serde(rename = "sub", default)]
    pub subscribe: Permission,
    /// Maximum subscriptions, `-1` for unlimited.
    #[serde(default = "unlimited")]
    pub subs: i64,
    /// Maximum bytes, `-1` for unlimited.
    #[serde(default = "unlimited")]
    pub data: i64,
    /// Maximum message payload, `-1` for unlimited.
    #[serde(default = "unlimited")]
    pub payload: i64,
    /// Issuing account, in operator mode only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub issuer_account: String,
    /// Always `user`.
    #[serde(rename = "type", default)]
    pub claim_type: String,
    /// Claim format version.
    #[serde(default = "default_version")]
    pub version: u32,
}

fn unlimited() -> i64 {
    -1
}

impl Default for User {
    fn default() -> Self {
        Self {
            publish: Permission::default(),
            subscribe: Permission::default(),
            subs: unlimited(),
            data: unlimited(),
            payload: unlimited(),
            issuer_account: String::new(),
            claim_type: Self::CLAIM_TYPE.to_owned(),
            version: CLAIMS_VERSION,
        }
    }
}

impl NatsClaim for User {
    const CLAIM_TYPE: &'static str = "user";

    fn claim_type(&self) -> &str {
        &self.claim_type
    }
}

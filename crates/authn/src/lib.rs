//! # uniqname authentication
//!
//! NATS claims handling for the auth callout service.
//!
//! This crate provides:
//! - **Claims**: Wire types for authorization requests, responses and user tokens
//! - **JWT**: nkey-signed token decoding with signature verification, and encoding
//! - **Validation**: Header policy and the authorization-request envelope checks
//! - **Signer**: The account key the callout signs everything with
//! - **Credentials**: The managed account table and password lookup
//!
//! ## Example
//!
//! ```no_run
//! use uniqname_authn::{
//!     AccountTable, Signer, authenticate,
//!     claims::{AuthorizationRequest, AuthorizationResponse},
//!     jwt::decode_claims,
//!     validation::validate_authorization_request,
//! };
//!
//! # fn example(token: &str, seed: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let signer = Signer::from_seed(seed)?;
//! let table = AccountTable::new().with_user("APP", "staff", "password");
//!
//! let request = decode_claims::<AuthorizationRequest>(token)?;
//! validate_authorization_request(&request)?;
//!
//! let opts = &request.nats.connect_opts;
//! let response = match authenticate(&table, &opts.username, &opts.password) {
//!     Some(account) => AuthorizationResponse::granted(signer.sign_user(&request.nats.user_nkey, account)?),
//!     None => AuthorizationResponse::denied("Authentication Failed"),
//! };
//! let reply = signer.sign_response(&request.nats.user_nkey, &request.nats.server_id.id, response)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// NATS claim wire types.
pub mod claims;
/// Managed accounts and password lookup.
pub mod credentials;
/// Authentication error types.
pub mod error;
/// Token encoding and decoding.
pub mod jwt;
/// Signing capability.
pub mod signer;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, missing_docs)]
pub mod testutil;
/// Header and envelope validation.
pub mod validation;

pub use claims::{AuthorizationRequest, AuthorizationResponse, Claims, User};
pub use credentials::{AccountTable, authenticate};
pub use error::{AuthError, Result};
pub use jwt::{decode_claims, encode_claims};
pub use signer::Signer;
pub use validation::validate_authorization_request;

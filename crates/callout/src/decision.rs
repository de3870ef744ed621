//! Outcome of an authorization request.

use uniqname_authn::{AuthError, AuthorizationResponse, Signer};

/// Audience of user tokens issued without an account check.
pub const DEFAULT_AUDIENCE: &str = "$G";

/// Denial reason for unknown users and wrong passwords.
pub const AUTH_FAILED_REASON: &str = "Authentication Failed";

/// Denial reason when the display name is taken.
pub const NAME_CONFLICT_REASON: &str = "Unique Client Name Required";

/// What the callout decided for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Unknown user or wrong password.
    AuthFailed,
    /// Valid credentials, but another connection holds the display name.
    NameConflict,
    /// Admit the connection into `audience`.
    Granted {
        /// Account the user token is scoped to.
        audience: String,
    },
}

impl Decision {
    /// A grant without an account, used for anonymous connections.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::Granted { audience: DEFAULT_AUDIENCE.to_owned() }
    }

    /// A grant into `account`.
    pub fn granted(account: impl Into<String>) -> Self {
        Self::Granted { audience: account.into() }
    }

    /// Denial reason, or `None` for a grant.
    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::AuthFailed => Some(AUTH_FAILED_REASON),
            Self::NameConflict => Some(NAME_CONFLICT_REASON),
            Self::Granted { .. } => None,
        }
    }

    /// Builds the unsigned response body, minting a user token for
    /// `user_nkey` on grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the user token cannot be signed.
    pub fn into_response(self, signer: &Signer, user_nkey: &str) -> Result<AuthorizationResponse, AuthError> {
        match self {
            Self::Granted { audience } => {
                Ok(AuthorizationResponse::granted(signer.sign_user(user_nkey, &audience)?))
            },
            Self::AuthFailed => Ok(AuthorizationResponse::denied(AUTH_FAILED_REASON)),
            Self::NameConflict => Ok(AuthorizationResponse::denied(NAME_CONFLICT_REASON)),
        }
    }
}

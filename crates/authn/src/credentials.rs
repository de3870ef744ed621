//! Managed accounts and password authentication.
//!
//! The [`AccountTable`] maps account name to a set of users and their
//! passwords. It is loaded once from configuration and never mutated;
//! [`authenticate`] is a pure lookup over it.
//!
//! ```toml
//! [accounts.APP]
//! staff = "password"
//! ```

use std::{collections::BTreeMap, fmt};

use serde::Deserialize;
use zeroize::Zeroizing;

/// Users of one account: username to password.
pub type CredentialSet = BTreeMap<String, Zeroizing<String>>;

/// Immutable table of managed accounts.
///
/// Only connections that authenticate against this table reserve a display
/// name, and only disconnects from these accounts release one.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct AccountTable {
    accounts: BTreeMap<String, CredentialSet>,
}

impl fmt::Debug for AccountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (account, users) in &self.accounts {
            map.entry(account, &users.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl AccountTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table with `user` added to `account`.
    ///
    /// Adding an existing user replaces its password.
    #[must_use]
    pub fn with_user(
        mut self,
        account: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.accounts
            .entry(account.into())
            .or_default()
            .insert(user.into(), Zeroizing::new(password.into()));
        self
    }

    /// Returns the table with an account that has no users yet.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.accounts.entry(account.into()).or_default();
        self
    }

    /// Whether disconnects from `account` are subject to name release.
    #[must_use]
    pub fn is_managed(&self, account: &str) -> bool {
        self.accounts.contains_key(account)
    }

    /// Account names, in lookup order.
    pub fn accounts(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// Number of managed accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the table has no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Authenticates `username`/`password` against `table`.
///
/// The first account, in table order, whose credential set contains
/// `username` is selected. The result is that account if `password`
/// matches, otherwise `None`; later accounts with the same username are not
/// consulted. Passwords are compared in constant time.
///
/// ```
/// use uniqname_authn::{AccountTable, authenticate};
///
/// let table = AccountTable::new().with_user("APP", "staff", "password");
///
/// assert_eq!(authenticate(&table, "staff", "password"), Some("APP"));
/// assert_eq!(authenticate(&table, "staff", "wrong"), None);
/// assert_eq!(authenticate(&table, "nobody", "password"), None);
/// ```
#[must_use]
pub fn authenticate<'a>(table: &'a AccountTable, username: &str, password: &str) -> Option<&'a str> {
    let (account, expected) = table
        .accounts
        .iter()
        .find_map(|(account, users)| users.get(username).map(|expected| (account, expected)))?;

    constant_time_eq(expected.as_bytes(), password.as_bytes()).then_some(account.as_str())
}

/// Compares two byte strings without an early exit on the first difference.
fn constant_time_eq(expected: &[u8], presented: &[u8]) -> bool {
    let max_len = expected.len().max(presented.len());
    let mut diff = expected.len() ^ presented.len();

    for idx in 0..max_len {
        let left = expected.get(idx).copied().unwrap_or(0);
        let right = presented.get(idx).copied().unwrap_or(0);
        diff |= usize::from(left ^ right);
    }

    diff == 0
}

//! User accounts
//!
//! Account records as the services see them. Ids are assigned by the store.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::credential::PasswordHash;

/// Store-assigned user identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: PasswordHash,
    pub is_admin: bool,
}

/// Account data handed to the store for insertion
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: PasswordHash,
    pub is_admin: bool,
}

impl NewUser {
    /// Regular (non-admin) account
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: PasswordHash) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password,
            is_admin: false,
        }
    }

    /// Flag the account as administrator. Only bootstrap code uses this.
    pub fn as_admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Materialize the record once the store has picked an id
    pub fn into_user(self, id: UserId) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            password: self.password,
            is_admin: self.is_admin,
        }
    }
}

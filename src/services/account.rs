//! Account Service
//!
//! Registration, authentication, login sessions, account deletion and
//! admin management. Keeps the admin set non-empty.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};

use crate::domain::{
    token_digest, Clock, DomainError, NewUser, PasswordHash, Session, SessionToken, User, UserId,
    ValidationError,
};
use crate::store::{AccountStore, AdminSnapshot, Cascade};

use super::RegisterCommand;

/// Session lifetime unless configured otherwise
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 24 * 60;

/// Outcome of a successful login. The token is only ever shown here.
#[derive(Debug, Clone)]
pub struct Login {
    pub user: User,
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

/// Handler for account operations
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            session_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Register a regular (non-admin) account
    pub async fn register(&self, command: RegisterCommand) -> Result<UserId, DomainError> {
        let name = required(&command.name, "name")?;
        let email = required(&command.email, "email")?;
        required(&command.password, "password")?;

        let user = NewUser::new(name, email, PasswordHash::new(&command.password));
        let user_id = self.store.insert_user(user).await?;

        tracing::info!(user_id = %user_id, "Account registered");
        Ok(user_id)
    }

    /// Check credentials. Every failure looks the same to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, DomainError> {
        if email.trim().is_empty() || password.trim().is_empty() {
            return Err(DomainError::InvalidCredentials);
        }

        match self.store.find_user_by_email(email.trim()).await? {
            Some(user) if user.password.verify(password) => Ok(user),
            Some(_) => Err(DomainError::InvalidCredentials),
            None => {
                // Same hashing cost as a wrong password
                dummy_credential().verify(password);
                Err(DomainError::InvalidCredentials)
            }
        }
    }

    /// Authenticate and open a session
    pub async fn login(&self, email: &str, password: &str) -> Result<Login, DomainError> {
        let user = self.authenticate(email, password).await?;

        let token = SessionToken::generate();
        let expires_at = self.clock.now() + self.session_ttl;
        self.store
            .insert_session(
                &token.digest(),
                Session {
                    user_id: user.id,
                    expires_at,
                },
            )
            .await?;

        tracing::info!(user_id = %user.id, "Session opened");
        Ok(Login {
            user,
            token,
            expires_at,
        })
    }

    /// Identify the holder of a bearer token. Unknown and expired tokens
    /// both fail with `InvalidCredentials`.
    pub async fn resolve_session(&self, token: &str) -> Result<UserId, DomainError> {
        let digest = token_digest(token);
        let Some(session) = self.store.find_session(&digest).await? else {
            return Err(DomainError::InvalidCredentials);
        };

        if session.is_expired(self.clock.now()) {
            self.store.delete_session(&digest).await?;
            tracing::debug!(user_id = %session.user_id, "Expired session removed");
            return Err(DomainError::InvalidCredentials);
        }

        Ok(session.user_id)
    }

    /// Close the session behind `token`; returns whether one was open
    pub async fn logout(&self, token: &str) -> Result<bool, DomainError> {
        Ok(self.store.delete_session(&token_digest(token)).await?)
    }

    /// Delete `target`, cascading to its enrollments and organized events
    pub async fn delete(&self, requester: UserId, target: UserId) -> Result<Cascade, DomainError> {
        let guard = move |s: &AdminSnapshot| authorize_deletion(requester, target, s);
        let cascade = self.store.delete_user(requester, target, &guard).await?;

        tracing::info!(
            requester = %requester,
            user_id = %target,
            events = cascade.events,
            enrollments = cascade.enrollments,
            "Account deleted"
        );
        Ok(cascade)
    }

    /// Grant or revoke admin privilege
    pub async fn set_admin_status(
        &self,
        requester: UserId,
        target: UserId,
        is_admin: bool,
    ) -> Result<(), DomainError> {
        let guard = move |s: &AdminSnapshot| authorize_admin_change(requester, target, is_admin, s);
        self.store.set_admin(requester, target, is_admin, &guard).await?;

        tracing::info!(requester = %requester, user_id = %target, is_admin, "Admin status changed");
        Ok(())
    }

    /// All accounts ordered by id
    pub async fn list(&self) -> Result<Vec<User>, DomainError> {
        Ok(self.store.list_users().await?)
    }

    /// All accounts, for administrators only
    pub async fn list_as(&self, requester: UserId) -> Result<Vec<User>, DomainError> {
        match self.store.find_user(requester).await? {
            Some(user) if user.is_admin => self.list().await,
            _ => Err(DomainError::PermissionDenied),
        }
    }

    pub async fn get(&self, id: UserId) -> Result<User, DomainError> {
        self.store
            .find_user(id)
            .await?
            .ok_or(DomainError::user_not_found(id))
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(trimmed)
}

fn dummy_credential() -> &'static PasswordHash {
    static DUMMY: OnceLock<PasswordHash> = OnceLock::new();
    DUMMY.get_or_init(|| PasswordHash::new("dummy-credential"))
}

/// Self-deletion, or deletion by an admin; never the last admin.
fn authorize_deletion(
    requester: UserId,
    target: UserId,
    snapshot: &AdminSnapshot,
) -> Result<(), DomainError> {
    let Some(acting) = &snapshot.requester else {
        return Err(DomainError::user_not_found(requester));
    };
    if requester != target && !acting.is_admin {
        return Err(DomainError::PermissionDenied);
    }

    let Some(deleted) = &snapshot.target else {
        return Err(DomainError::user_not_found(target));
    };
    if deleted.is_admin && snapshot.admin_count <= 1 {
        return Err(DomainError::LastAdmin);
    }

    Ok(())
}

/// Admins may change other users' flag as long as one admin remains.
fn authorize_admin_change(
    requester: UserId,
    target: UserId,
    is_admin: bool,
    snapshot: &AdminSnapshot,
) -> Result<(), DomainError> {
    if !snapshot.requester.as_ref().is_some_and(|u| u.is_admin) {
        return Err(DomainError::PermissionDenied);
    }
    if requester == target {
        return Err(DomainError::SelfModification);
    }

    let Some(changed) = &snapshot.target else {
        return Err(DomainError::user_not_found(target));
    };
    let remaining = if changed.is_admin && !is_admin {
        snapshot.admin_count - 1
    } else {
        snapshot.admin_count
    };
    if remaining < 1 {
        return Err(DomainError::LastAdmin);
    }

    Ok(())
}

//! Startup seeding
//!
//! Guarantees an administrator exists on first start.

use crate::config::AdminSeed;
use crate::domain::{DomainError, NewUser, PasswordHash, UserId};
use crate::store::{AccountStore, StoreError};

/// Insert the configured administrator when the store has none.
///
/// Returns the new admin's id, or `None` if an admin already existed.
pub async fn seed_admin(
    accounts: &dyn AccountStore,
    seed: &AdminSeed,
) -> Result<Option<UserId>, DomainError> {
    if accounts.count_admins().await? > 0 {
        tracing::debug!("Administrator present, skipping seed");
        return Ok(None);
    }

    let admin = NewUser::new(seed.name.trim(), seed.email.trim(), PasswordHash::new(&seed.password)).as_admin();

    match accounts.insert_user(admin).await {
        Ok(user_id) => {
            tracing::info!(user_id = %user_id, email = %seed.email, "Seeded initial administrator");
            Ok(Some(user_id))
        }
        // Another instance seeded concurrently
        Err(StoreError::DuplicateEmail(email)) => {
            tracing::warn!(email = %email, "Admin seed email already registered");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

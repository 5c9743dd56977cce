/// Startup admin bootstrap
///
/// Admin accounts are never created through the API; they come from here.
/// When `SEED_ADMIN=true`, the account named by `ADMIN_EMAIL` is created (or
/// reset to an active admin with a fresh password) at startup.
use crate::config::BootstrapConfig;
use aptdesk_shared::{
    auth::password,
    models::user::{CreateUser, User, UserRole},
};
use sqlx::PgPool;
use tracing::{info, warn};

/// Creates or refreshes the bootstrap admin account
pub async fn bootstrap_admin(pool: &PgPool, config: &BootstrapConfig) -> anyhow::Result<()> {
    if !config.seed_admin {
        return Ok(());
    }

    if config.admin_email.is_empty() || config.admin_password.is_empty() {
        warn!("SEED_ADMIN is set but ADMIN_EMAIL/ADMIN_PASSWORD are missing, skipping");
        return Ok(());
    }

    let password_hash = password::hash_password(&config.admin_password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;

    match User::find_by_email(pool, &config.admin_email).await? {
        Some(existing) => {
            User::promote_to_admin(pool, existing.id, &password_hash).await?;
            info!(email = %config.admin_email, "Refreshed bootstrap admin account");
        }
        None => {
            let admin = User::create(
                pool,
                CreateUser {
                    name: config.admin_name.clone(),
                    email: config.admin_email.trim().to_lowercase(),
                    password_hash,
                    role: UserRole::Admin,
                },
            )
            .await?;
            info!(user_id = %admin.id, email = %admin.email, "Created bootstrap admin account");
        }
    }

    Ok(())
}

use anyhow::Result;
use sea_orm::DatabaseConnection;

use crate::shared::config::AuthConfig;
use crate::system::users::{repository, service};

/// Ensure an admin user exists (create one from config if the table is empty)
pub async fn ensure_admin_user_exists(db: &DatabaseConnection, auth: &AuthConfig) -> Result<()> {
    let count = repository::count_users(db).await?;
    if count > 0 {
        return Ok(());
    }

    tracing::info!("No users found. Creating bootstrap admin user...");
    let admin = service::create_bootstrap_admin(
        db,
        &auth.bootstrap_admin_email,
        &auth.bootstrap_admin_password,
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create bootstrap admin: {}", e))?;

    tracing::warn!(
        "Bootstrap admin {} created (id {}). Change its password.",
        admin.email,
        admin.id
    );
    Ok(())
}

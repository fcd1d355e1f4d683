use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::system::tasks::manager::TaskManager;
use crate::system::verification::service;

/// Clears verification codes past their expiry
pub struct VerificationCodeCleanupManager;

#[async_trait]
impl TaskManager for VerificationCodeCleanupManager {
    fn task_type(&self) -> &'static str {
        "verification_code_cleanup"
    }

    async fn run(&self, db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64> {
        service::purge_expired(db, now).await
    }
}

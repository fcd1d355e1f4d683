use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::system::rate_limit::service;
use crate::system::tasks::manager::TaskManager;

/// Deletes rate-limit windows nobody has touched for a day
pub struct RateLimitCleanupManager;

#[async_trait]
impl TaskManager for RateLimitCleanupManager {
    fn task_type(&self) -> &'static str {
        "rate_limit_cleanup"
    }

    async fn run(&self, db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64> {
        service::cleanup_stale(db, now).await
    }
}

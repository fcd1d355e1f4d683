use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

/// A periodic maintenance job.
/// Each task type has its own implementation of this trait.
#[async_trait]
pub trait TaskManager: Send + Sync {
    /// Task type handled by this manager, also used in logs.
    fn task_type(&self) -> &'static str;

    /// Run one pass at `now`. Returns the number of affected records.
    async fn run(&self, db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64>;
}

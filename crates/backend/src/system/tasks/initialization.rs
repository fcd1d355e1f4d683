use anyhow::Result;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use super::{
    managers::{RateLimitCleanupManager, VerificationCodeCleanupManager},
    registry::TaskManagerRegistry,
    worker::ScheduledTaskWorker,
};
use crate::shared::config::SchedulerConfig;

/// Builds the task registry and the background worker.
pub fn initialize_scheduled_tasks(
    db: DatabaseConnection,
    config: &SchedulerConfig,
) -> Result<ScheduledTaskWorker> {
    let mut registry = TaskManagerRegistry::new();
    registry.register(RateLimitCleanupManager, &config.rate_limit_cleanup)?;
    registry.register(VerificationCodeCleanupManager, &config.verification_cleanup)?;

    Ok(ScheduledTaskWorker::new(
        Arc::new(registry),
        db,
        config.tick_seconds,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;

    #[tokio::test]
    async fn default_schedules_parse() {
        let db = connect_in_memory().await.unwrap();
        assert!(initialize_scheduled_tasks(db, &SchedulerConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn bad_schedule_is_reported() {
        let db = connect_in_memory().await.unwrap();
        let config = SchedulerConfig {
            rate_limit_cleanup: "every day".into(),
            ..SchedulerConfig::default()
        };
        assert!(initialize_scheduled_tasks(db, &config).is_err());
    }
}

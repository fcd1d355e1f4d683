use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use super::registry::TaskManagerRegistry;

/// Background worker running registered tasks when their schedule is due.
pub struct ScheduledTaskWorker {
    registry: Arc<TaskManagerRegistry>,
    db: DatabaseConnection,
    interval_seconds: u64,
    next_runs: HashMap<&'static str, DateTime<Utc>>,
}

impl ScheduledTaskWorker {
    pub fn new(registry: Arc<TaskManagerRegistry>, db: DatabaseConnection, interval_seconds: u64) -> Self {
        Self {
            registry,
            db,
            interval_seconds: interval_seconds.max(1),
            next_runs: HashMap::new(),
        }
    }

    /// Runs the scheduling loop forever.
    pub async fn run_loop(mut self) {
        info!(
            "Scheduled task worker started with interval {} seconds",
            self.interval_seconds
        );
        let mut interval = time::interval(time::Duration::from_secs(self.interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            self.process_due_tasks(Utc::now()).await;
        }
    }

    /// Runs every task whose next occurrence is at or before `now`.
    /// A task seen for the first time is only scheduled, not run.
    pub async fn process_due_tasks(&mut self, now: DateTime<Utc>) -> usize {
        let mut ran = 0;
        for entry in self.registry.entries() {
            let task_type = entry.manager.task_type();
            let next = match self.next_runs.get(task_type) {
                Some(next) => *next,
                None => {
                    if let Some(next) = entry.schedule.after(&now).next() {
                        debug!("Task '{}' first run at {}", task_type, next);
                        self.next_runs.insert(task_type, next);
                    }
                    continue;
                }
            };
            if next > now {
                continue;
            }

            info!("Task '{}' is due. Running...", task_type);
            match entry.manager.run(&self.db, now).await {
                Ok(affected) => info!("Task '{}' completed, {} records affected", task_type, affected),
                Err(e) => error!("Task '{}' failed: {:?}", task_type, e),
            }
            ran += 1;

            match entry.schedule.after(&now).next() {
                Some(next) => {
                    self.next_runs.insert(task_type, next);
                }
                None => {
                    self.next_runs.remove(task_type);
                }
            }
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use crate::system::tasks::manager::TaskManager;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct Counter(Arc<AtomicU64>);

    #[async_trait]
    impl TaskManager for Counter {
        fn task_type(&self) -> &'static str {
            "counter"
        }

        async fn run(&self, _db: &DatabaseConnection, _now: DateTime<Utc>) -> anyhow::Result<u64> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[tokio::test]
    async fn runs_when_schedule_is_due() {
        let runs = Arc::new(AtomicU64::new(0));
        let mut registry = TaskManagerRegistry::new();
        // top of every minute
        registry
            .register(Counter(Arc::clone(&runs)), "0 * * * * *")
            .unwrap();

        let db = connect_in_memory().await.unwrap();
        let mut worker = ScheduledTaskWorker::new(Arc::new(registry), db, 60);
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap();

        assert_eq!(worker.process_due_tasks(start).await, 0);
        assert_eq!(worker.process_due_tasks(start + Duration::seconds(20)).await, 0);
        assert_eq!(worker.process_due_tasks(start + Duration::seconds(30)).await, 1);
        assert_eq!(worker.process_due_tasks(start + Duration::seconds(40)).await, 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejects_invalid_cron_expression() {
        let mut registry = TaskManagerRegistry::new();
        assert!(registry.register(Counter::default(), "not a cron").is_err());
        assert!(registry.get("counter").is_none());
    }
}

use anyhow::{Context, Result};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;

use super::manager::TaskManager;

/// A manager together with the cron schedule it runs on
#[derive(Clone)]
pub struct ScheduledEntry {
    pub manager: Arc<dyn TaskManager>,
    pub schedule: Schedule,
}

/// Task manager registry.
/// Keeps registration order, which is also the order due tasks run in.
#[derive(Default)]
pub struct TaskManagerRegistry {
    entries: Vec<ScheduledEntry>,
}

impl TaskManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a manager under a cron expression (seconds field included).
    pub fn register<T: TaskManager + 'static>(&mut self, manager: T, cron_expr: &str) -> Result<()> {
        let schedule = Schedule::from_str(cron_expr).with_context(|| {
            format!("Invalid schedule '{}' for task {}", cron_expr, manager.task_type())
        })?;
        self.entries.retain(|e| e.manager.task_type() != manager.task_type());
        self.entries.push(ScheduledEntry {
            manager: Arc::new(manager),
            schedule,
        });
        Ok(())
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskManager>> {
        self.entries
            .iter()
            .find(|e| e.manager.task_type() == task_type)
            .map(|e| Arc::clone(&e.manager))
    }

    pub fn entries(&self) -> &[ScheduledEntry] {
        &self.entries
    }
}

//! Sliding-window rate limiter backed by the `rate_limits` table.
//!
//! Each key stores the epoch-millisecond times of the requests still inside
//! the window. A check reads the record, drops expired entries, and either
//! rejects or appends `now`. The read and the write share one transaction and
//! the write is a version compare-and-swap, so concurrent checks on one key
//! are serialized. A store failure never blocks traffic: the limiter allows
//! the request and logs a warning.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use contracts::system::rate_limit::{RateLimitPolicy, RateLimitResult};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

use super::repository;
use crate::shared::error::{AppError, AppResult};

const MAX_ATTEMPTS: usize = 5;

/// Records untouched for this long are removed by the cleanup task
pub const STALE_AFTER_HOURS: i64 = 24;
pub const CLEANUP_BATCH: u64 = 500;

/// Outcome of a check against the current window, before persisting
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDecision {
    pub result: RateLimitResult,
    /// Window to store when the request is allowed
    pub timestamps: Vec<i64>,
}

/// Apply `policy` to the stored request times at `now_ms`
pub fn decide(stored: &[i64], policy: &RateLimitPolicy, now_ms: i64) -> WindowDecision {
    let window_start = now_ms - policy.window_ms;
    let mut timestamps: Vec<i64> = stored.iter().copied().filter(|t| *t > window_start).collect();

    if timestamps.len() >= policy.max_requests as usize {
        let oldest = timestamps.iter().min().copied().unwrap_or(now_ms);
        let wait_ms = oldest + policy.window_ms - now_ms;
        let retry_after = ((wait_ms + 999) / 1000).max(1) as u64;
        return WindowDecision {
            result: RateLimitResult::denied(retry_after),
            timestamps,
        };
    }

    timestamps.push(now_ms);
    let remaining = policy.max_requests - timestamps.len() as u32;
    WindowDecision {
        result: RateLimitResult::allowed(remaining),
        timestamps,
    }
}

pub async fn check_rate_limit(
    db: &DatabaseConnection,
    identifier: &str,
    policy: &RateLimitPolicy,
) -> RateLimitResult {
    check_rate_limit_at(db, identifier, policy, Utc::now()).await
}

pub async fn check_rate_limit_at(
    db: &DatabaseConnection,
    identifier: &str,
    policy: &RateLimitPolicy,
    now: DateTime<Utc>,
) -> RateLimitResult {
    let key = policy.key(identifier);
    match check_with_retry(db, &key, policy, now).await {
        Ok(result) => {
            if !result.allowed {
                tracing::info!("Rate limit exceeded for {}", key);
            }
            result
        }
        Err(e) => {
            tracing::warn!("Rate limiter unavailable for {}, allowing request: {:#}", key, e);
            RateLimitResult::allowed(policy.max_requests)
        }
    }
}

/// Check and turn a rejection into `AppError::RateLimited`
pub async fn enforce(
    db: &DatabaseConnection,
    identifier: &str,
    policy: &RateLimitPolicy,
) -> AppResult<RateLimitResult> {
    let result = check_rate_limit(db, identifier, policy).await;
    if result.allowed {
        Ok(result)
    } else {
        Err(AppError::RateLimited {
            retry_after: result.retry_after.unwrap_or(1),
        })
    }
}

async fn check_with_retry(
    db: &DatabaseConnection,
    key: &str,
    policy: &RateLimitPolicy,
    now: DateTime<Utc>,
) -> anyhow::Result<RateLimitResult> {
    let mut last_error = None;
    for _ in 0..MAX_ATTEMPTS {
        let txn = db.begin().await?;
        match check_in_transaction(&txn, key, policy, now).await {
            Ok(Some(result)) => {
                txn.commit().await?;
                return Ok(result);
            }
            Ok(None) => {
                txn.rollback().await?;
            }
            Err(e) => {
                txn.rollback().await?;
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("too much contention on {}", key)))
}

/// `None` when a concurrent writer won the race
async fn check_in_transaction(
    txn: &DatabaseTransaction,
    key: &str,
    policy: &RateLimitPolicy,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<RateLimitResult>> {
    let existing = repository::find(txn, key).await?;
    let stored = existing.as_ref().map(|r| r.timestamps.as_slice()).unwrap_or(&[]);
    let decision = decide(stored, policy, now.timestamp_millis());
    if !decision.result.allowed {
        return Ok(Some(decision.result));
    }

    let written = match &existing {
        Some(record) => {
            repository::compare_and_swap(txn, key, &decision.timestamps, now, record.version).await?
        }
        None => repository::insert(txn, key, &decision.timestamps, now).await?,
    };
    Ok(written.then_some(decision.result))
}

/// Remove records not touched in the last day, one batch per call
pub async fn cleanup_stale(db: &DatabaseConnection, now: DateTime<Utc>) -> anyhow::Result<u64> {
    let cutoff = now - Duration::hours(STALE_AFTER_HOURS);
    let deleted = repository::delete_stale(db, cutoff, CLEANUP_BATCH).await?;
    if deleted > 0 {
        tracing::info!("Removed {} stale rate limit records", deleted);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use chrono::TimeZone;
    use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};

    const SMS: RateLimitPolicy = RateLimitPolicy::SMS_VERIFICATION;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn decide_prunes_expired_entries() {
        let now = 10_000_000;
        let stored = [now - SMS.window_ms, now - 1000];
        let decision = decide(&stored, &SMS, now);
        assert!(decision.result.allowed);
        assert_eq!(decision.result.remaining, 1);
        assert_eq!(decision.timestamps, vec![now - 1000, now]);
    }

    #[test]
    fn decide_rounds_retry_up_to_whole_seconds() {
        let now = 10_000_000;
        let oldest = now - SMS.window_ms + 1500;
        let decision = decide(&[oldest, now - 10, now - 5], &SMS, now);
        assert!(!decision.result.allowed);
        assert_eq!(decision.result.remaining, 0);
        assert_eq!(decision.result.retry_after, Some(2));
    }

    #[tokio::test]
    async fn sms_policy_allows_three_then_denies() {
        let db = connect_in_memory().await.unwrap();
        let start = 1_700_000_000_000;

        let mut remaining = Vec::new();
        for i in 0..3 {
            let result = check_rate_limit_at(&db, "user-1", &SMS, at(start + i * 1000)).await;
            assert!(result.allowed);
            remaining.push(result.remaining);
        }
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = check_rate_limit_at(&db, "user-1", &SMS, at(start + 3000)).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after.unwrap() > 0);

        // a different identifier has its own window
        let other = check_rate_limit_at(&db, "user-2", &SMS, at(start + 3000)).await;
        assert_eq!(other.remaining, 2);

        // the oldest request leaves the window
        let later = check_rate_limit_at(&db, "user-1", &SMS, at(start + SMS.window_ms + 1)).await;
        assert!(later.allowed);
        assert_eq!(later.remaining, 0);
    }

    #[tokio::test]
    async fn limiter_fails_open_when_store_is_missing() {
        let db = connect_in_memory().await.unwrap();
        db.execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "DROP TABLE rate_limits".to_string(),
        ))
        .await
        .unwrap();

        let result = check_rate_limit(&db, "user-1", &SMS).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, SMS.max_requests);
    }

    #[tokio::test]
    async fn enforce_maps_denial_to_rate_limited() {
        let db = connect_in_memory().await.unwrap();
        let policy = RateLimitPolicy {
            max_requests: 1,
            window_ms: 60_000,
            key_prefix: "test",
        };
        enforce(&db, "ip", &policy).await.unwrap();
        let err = enforce(&db, "ip", &policy).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { retry_after } if retry_after >= 1));
    }

    #[tokio::test]
    async fn cleanup_removes_only_stale_records() {
        let db = connect_in_memory().await.unwrap();
        let now = Utc::now();
        check_rate_limit_at(&db, "old", &SMS, now - Duration::hours(30)).await;
        check_rate_limit_at(&db, "fresh", &SMS, now - Duration::hours(1)).await;

        assert_eq!(cleanup_stale(&db, now).await.unwrap(), 1);
        assert!(repository::find(&db, "sms:old").await.unwrap().is_none());
        assert!(repository::find(&db, "sms:fresh").await.unwrap().is_some());
    }
}

use serde::{Deserialize, Serialize};

/// Sliding-window limit: at most `max_requests` within `window_ms`, counted
/// per `key_prefix:identifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: i64,
    pub key_prefix: &'static str,
}

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

impl RateLimitPolicy {
    pub const SMS_VERIFICATION: RateLimitPolicy = RateLimitPolicy {
        max_requests: 3,
        window_ms: HOUR_MS,
        key_prefix: "sms",
    };

    pub const PASSWORD_RESET: RateLimitPolicy = RateLimitPolicy {
        max_requests: 5,
        window_ms: HOUR_MS,
        key_prefix: "password_reset",
    };

    pub const ORDER_CREATION: RateLimitPolicy = RateLimitPolicy {
        max_requests: 10,
        window_ms: HOUR_MS,
        key_prefix: "order_create",
    };

    pub const GENERAL_API: RateLimitPolicy = RateLimitPolicy {
        max_requests: 100,
        window_ms: MINUTE_MS,
        key_prefix: "api",
    };

    pub const ADMIN_API: RateLimitPolicy = RateLimitPolicy {
        max_requests: 1000,
        window_ms: HOUR_MS,
        key_prefix: "admin_api",
    };

    pub const PUBLIC_IP: RateLimitPolicy = RateLimitPolicy {
        max_requests: 50,
        window_ms: MINUTE_MS,
        key_prefix: "public_ip",
    };

    pub fn key(&self, identifier: &str) -> String {
        format!("{}:{}", self.key_prefix, identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// Seconds until the oldest counted request leaves the window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl RateLimitResult {
    pub fn allowed(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
        }
    }

    pub fn denied(retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: Some(retry_after),
        }
    }
}

pub mod rate_limit_cleanup;
pub mod verification_cleanup;

pub use rate_limit_cleanup::RateLimitCleanupManager;
pub use verification_cleanup::VerificationCodeCleanupManager;

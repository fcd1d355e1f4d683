pub mod auth;
pub mod handlers;
pub mod initialization;
pub mod middleware;
pub mod rate_limit;
pub mod tasks;
pub mod tracing;
pub mod users;
pub mod verification;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use super::config::Config;
use super::realtime::Feeds;
use crate::system::auth::jwt::JwtKeys;
use crate::system::verification::sms::SmsSender;

/// Everything a request handler needs, built once at startup and handed to
/// axum as router state.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtKeys>,
    pub feeds: Feeds,
    pub sms: Arc<dyn SmsSender>,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: Config,
        jwt: JwtKeys,
        sms: Arc<dyn SmsSender>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            feeds: Feeds::default(),
            sms,
        }
    }
}

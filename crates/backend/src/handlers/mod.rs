pub mod carts;
pub mod offers;
pub mod orders;
pub mod products;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::{AppError, AppResult};
use crate::shared::realtime::Subscription;

pub(crate) fn parse_uuid(id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| AppError::InvalidArgument(format!("Invalid id '{}'", id)))
}

/// `?confirm=true` on destructive requests
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub confirm: bool,
}

/// `?clientId=...` identifies the listener; a client re-subscribing to the
/// same document ends its previous stream
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub client_id: Option<String>,
}

impl EventsQuery {
    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}

/// Server-sent events: the current document first, then every update
pub(crate) fn event_stream<T>(
    initial: T,
    subscription: Subscription<T>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    T: Serialize + Clone + Send + 'static,
{
    let stream = futures::stream::once(async move { initial })
        .chain(subscription.into_stream())
        .map(|value| Event::default().json_data(&value));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

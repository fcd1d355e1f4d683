use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use chrono::Utc;
use contracts::domain::a003_cart::{AddOfferRequest, AddProductRequest, Cart, UpdateQuantityRequest};
use futures::Stream;

use super::{event_stream, parse_uuid, EventsQuery};
use crate::domain::a003_cart::service;
use crate::shared::error::AppResult;
use crate::shared::state::AppState;
use crate::system::auth::extractor::CurrentUser;

/// GET /api/carts/me (`null` when the user has no cart)
pub async fn get_mine(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> AppResult<Json<Option<Cart>>> {
    Ok(Json(service::get(&state.db, &claims.sub).await?))
}

/// DELETE /api/carts/me
pub async fn clear(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> AppResult<StatusCode> {
    service::clear(&state.db, &state.feeds.carts, &claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/carts/me/offers
pub async fn add_offer(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<AddOfferRequest>,
) -> AppResult<Json<Cart>> {
    Ok(Json(
        service::add_offer(&state.db, &state.feeds.carts, &claims.sub, request).await?,
    ))
}

/// POST /api/carts/me/products
pub async fn add_product(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<AddProductRequest>,
) -> AppResult<Json<Cart>> {
    Ok(Json(
        service::add_product(&state.db, &state.feeds.carts, &claims.sub, request).await?,
    ))
}

/// PUT /api/carts/me/items/:id
pub async fn update_quantity(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateQuantityRequest>,
) -> AppResult<Json<Option<Cart>>> {
    let item_id = parse_uuid(&id)?;
    Ok(Json(
        service::update_quantity(&state.db, &state.feeds.carts, &claims.sub, item_id, request.quantity)
            .await?,
    ))
}

/// DELETE /api/carts/me/items/:id
pub async fn remove_item(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Option<Cart>>> {
    let item_id = parse_uuid(&id)?;
    Ok(Json(
        service::remove(&state.db, &state.feeds.carts, &claims.sub, item_id).await?,
    ))
}

/// POST /api/carts/me/validate
pub async fn validate(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> AppResult<Json<Option<Cart>>> {
    Ok(Json(
        service::validate(&state.db, &state.feeds.carts, &claims.sub, Utc::now()).await?,
    ))
}

/// GET /api/carts/me/events
pub async fn events(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Query(query): Query<EventsQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let subscription = state.feeds.carts.subscribe(&query.client_id(), &claims.sub);
    let current = service::get(&state.db, &claims.sub)
        .await?
        .unwrap_or_else(|| Cart::new(claims.sub.clone(), Utc::now()));
    Ok(event_stream(current, subscription))
}

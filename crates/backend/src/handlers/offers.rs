use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use contracts::domain::a002_offer::{Offer, OfferDto, OfferId};

use super::{parse_uuid, ConfirmQuery};
use crate::domain::a002_offer::service;
use crate::shared::error::AppResult;
use crate::shared::state::AppState;
use crate::system::auth::extractor::CurrentUser;

fn offer_id(id: &str) -> AppResult<OfferId> {
    parse_uuid(id).map(OfferId)
}

/// GET /api/offers
pub async fn list_public(State(state): State<AppState>) -> AppResult<Json<Vec<Offer>>> {
    Ok(Json(service::list_public(&state.db, Utc::now()).await?))
}

/// GET /api/offers/:id
pub async fn get_public(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Offer>> {
    Ok(Json(service::get_public(&state.db, offer_id(&id)?, Utc::now()).await?))
}

/// GET /api/admin/offers
pub async fn list_all(State(state): State<AppState>) -> AppResult<Json<Vec<Offer>>> {
    Ok(Json(service::list_all(&state.db).await?))
}

/// POST /api/admin/offers
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(dto): Json<OfferDto>,
) -> AppResult<(StatusCode, Json<Offer>)> {
    let offer = service::create(&state.db, dto, Some(claims.sub)).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// PUT /api/admin/offers/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(dto): Json<OfferDto>,
) -> AppResult<Json<Offer>> {
    Ok(Json(service::update(&state.db, offer_id(&id)?, dto).await?))
}

/// POST /api/admin/offers/:id/publish
pub async fn publish(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Offer>> {
    Ok(Json(service::publish(&state.db, offer_id(&id)?, Utc::now()).await?))
}

/// POST /api/admin/offers/:id/deactivate
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Offer>> {
    Ok(Json(service::deactivate(&state.db, offer_id(&id)?).await?))
}

/// DELETE /api/admin/offers/:id?confirm=true
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ConfirmQuery>,
) -> AppResult<StatusCode> {
    service::delete(&state.db, offer_id(&id)?, query.confirm).await?;
    Ok(StatusCode::NO_CONTENT)
}

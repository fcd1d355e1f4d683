use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use chrono::Utc;
use contracts::domain::a004_order::{
    CheckoutRequest, Order, OrderId, OrderListFilter, SetInvoiceRequest, TransitionsResponse,
    UpdateStatusRequest,
};
use futures::Stream;

use super::{event_stream, parse_uuid, EventsQuery};
use crate::domain::a004_order::service;
use crate::shared::error::AppResult;
use crate::shared::state::AppState;
use crate::system::auth::extractor::CurrentUser;

fn order_id(id: &str) -> AppResult<OrderId> {
    parse_uuid(id).map(OrderId)
}

/// POST /api/orders
pub async fn checkout(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let order = service::checkout(
        &state.db,
        &state.feeds,
        &state.config.orders.pricing(),
        &claims.sub,
        request,
        Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /api/orders/mine
pub async fn list_mine(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(service::list_for_user(&state.db, &claims.sub).await?))
}

/// GET /api/orders/:id
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    Ok(Json(service::get_for(&state.db, order_id(&id)?, &claims).await?))
}

/// GET /api/orders/:id/events
pub async fn events(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let order = service::get_for(&state.db, order_id(&id)?, &claims).await?;
    let subscription = state
        .feeds
        .orders
        .subscribe(&query.client_id(), &order.id.to_string());
    Ok(event_stream(order, subscription))
}

/// GET /api/admin/orders
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<OrderListFilter>,
) -> AppResult<Json<Vec<Order>>> {
    Ok(Json(service::list(&state.db, &filter).await?))
}

/// POST /api/admin/orders/:id/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> AppResult<Json<Order>> {
    let order = service::update_status(
        &state.db,
        &state.feeds.orders,
        order_id(&id)?,
        request,
        Utc::now(),
    )
    .await?;
    Ok(Json(order))
}

/// GET /api/admin/orders/:id/transitions
pub async fn transitions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TransitionsResponse>> {
    Ok(Json(service::transitions(&state.db, order_id(&id)?).await?))
}

/// PUT /api/admin/orders/:id/invoice
pub async fn set_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetInvoiceRequest>,
) -> AppResult<Json<Order>> {
    Ok(Json(
        service::set_invoice_url(&state.db, &state.feeds.orders, order_id(&id)?, &request.invoice_url)
            .await?,
    ))
}

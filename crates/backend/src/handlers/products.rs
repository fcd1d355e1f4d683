use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use contracts::domain::a001_product::{Product, ProductDto, ProductId};

use super::{parse_uuid, ConfirmQuery};
use crate::domain::a001_product::service;
use crate::shared::error::AppResult;
use crate::shared::state::AppState;
use crate::system::auth::extractor::CurrentUser;

fn product_id(id: &str) -> AppResult<ProductId> {
    parse_uuid(id).map(ProductId)
}

/// GET /api/products
pub async fn list_public(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(service::list_public(&state.db).await?))
}

/// GET /api/products/:id
pub async fn get_public(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Product>> {
    Ok(Json(service::get_public(&state.db, product_id(&id)?).await?))
}

/// GET /api/admin/products
pub async fn list_all(State(state): State<AppState>) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(service::list_all(&state.db).await?))
}

/// POST /api/admin/products
pub async fn create(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(dto): Json<ProductDto>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let product = service::create(&state.db, dto, Some(claims.sub)).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /api/admin/products/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(dto): Json<ProductDto>,
) -> AppResult<Json<Product>> {
    Ok(Json(service::update(&state.db, product_id(&id)?, dto).await?))
}

/// DELETE /api/admin/products/:id?confirm=true
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ConfirmQuery>,
) -> AppResult<StatusCode> {
    service::delete(&state.db, product_id(&id)?, query.confirm).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Checkout and order lifecycle.
//!
//! Status changes go through the same transition table the clients use
//! (`Order::apply_transition`) and are written with a version check, so a
//! request built on a stale view of the order is re-validated against the
//! current status before anything is stored.

use chrono::{DateTime, Utc};
use contracts::domain::a003_cart::Cart;
use contracts::domain::a004_order::{
    CheckoutRequest, Order, OrderId, OrderListFilter, OrderStatus, PricingRules,
    TransitionsResponse, UpdateStatusRequest,
};
use contracts::domain::common::AggregateRoot;
use contracts::system::auth::TokenClaims;
use contracts::system::rate_limit::RateLimitPolicy;
use sea_orm::{DatabaseConnection, TransactionTrait};

use super::repository;
use crate::domain::a003_cart::{repository as carts, service as cart_service};
use crate::shared::error::{AppError, AppResult};
use crate::shared::format::format_cents;
use crate::shared::realtime::{ChangeFeed, Feeds};
use crate::system::rate_limit::service as rate_limit;

const MAX_ATTEMPTS: usize = 5;

/// Turn the caller's cart into a pending order and delete the cart, both in
/// one transaction
pub async fn checkout(
    db: &DatabaseConnection,
    feeds: &Feeds,
    pricing: &PricingRules,
    user_id: &str,
    req: CheckoutRequest,
    now: DateTime<Utc>,
) -> AppResult<Order> {
    req.validate().map_err(AppError::InvalidArgument)?;
    rate_limit::enforce(db, user_id, &RateLimitPolicy::ORDER_CREATION).await?;

    let cart = cart_service::validate(db, &feeds.carts, user_id, now)
        .await?
        .filter(|cart| !cart.is_empty())
        .ok_or_else(|| AppError::FailedPrecondition("Cart is empty".into()))?;
    if cart.has_invalid_items {
        return Err(AppError::FailedPrecondition(
            "Cart contains offers that are no longer available".into(),
        ));
    }

    let mut order = Order::from_cart(&cart, &req, pricing, now);
    order.before_write();
    place(db, &cart, &order).await?;

    tracing::info!(
        "Order {} placed by {}: total {}",
        order.order_number,
        user_id,
        format_cents(order.total)
    );
    feeds.orders.publish(&order.id.to_string(), order.clone());
    feeds.carts.publish(user_id, Cart::new(user_id, now));
    Ok(order)
}

/// Store `order` and delete `cart`, provided the cart is still at the
/// version the order was priced from
async fn place(db: &DatabaseConnection, cart: &Cart, order: &Order) -> AppResult<()> {
    let txn = db.begin().await?;
    if !carts::delete_if_version(&txn, &cart.user_id, cart.metadata.version).await? {
        txn.rollback().await?;
        return Err(AppError::FailedPrecondition(
            "Cart changed during checkout, review it and try again".into(),
        ));
    }
    repository::insert(&txn, order).await?;
    txn.commit().await?;
    Ok(())
}

pub async fn get(db: &DatabaseConnection, id: OrderId) -> AppResult<Order> {
    repository::get_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::not_found(Order::element_name()))
}

/// Order as seen by `caller`: owners and admins only
pub async fn get_for(db: &DatabaseConnection, id: OrderId, caller: &TokenClaims) -> AppResult<Order> {
    let order = get(db, id).await?;
    if !caller.admin && !order.is_owned_by(&caller.sub) {
        return Err(AppError::PermissionDenied(
            "You do not have access to this order".into(),
        ));
    }
    Ok(order)
}

pub async fn list(db: &DatabaseConnection, filter: &OrderListFilter) -> AppResult<Vec<Order>> {
    Ok(repository::list(db, filter).await?)
}

pub async fn list_for_user(db: &DatabaseConnection, user_id: &str) -> AppResult<Vec<Order>> {
    Ok(repository::list_by_user(db, user_id).await?)
}

pub async fn transitions(db: &DatabaseConnection, id: OrderId) -> AppResult<TransitionsResponse> {
    let order = get(db, id).await?;
    Ok(TransitionsResponse {
        current: order.status,
        available: order.available_transitions(),
    })
}

/// Re-read, change and write back under the version check, then publish
async fn modify<F>(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Order>,
    id: OrderId,
    mut change: F,
) -> AppResult<Order>
where
    F: FnMut(&mut Order) -> AppResult<()>,
{
    for _ in 0..MAX_ATTEMPTS {
        let mut order = get(db, id).await?;
        let expected = order.metadata.version;
        change(&mut order)?;
        order.before_write();
        if repository::update_if_version(db, &order, expected).await? {
            feed.publish(&order.id.to_string(), order.clone());
            return Ok(order);
        }
        tracing::debug!("Order {} changed concurrently, retrying", id);
    }
    Err(AppError::FailedPrecondition(
        "Order was modified concurrently, try again".into(),
    ))
}

pub async fn update_status(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Order>,
    id: OrderId,
    req: UpdateStatusRequest,
    now: DateTime<Utc>,
) -> AppResult<Order> {
    if req.status == OrderStatus::Cancelled && !req.confirm {
        return Err(AppError::FailedPrecondition(
            "Cancelling an order must be confirmed".into(),
        ));
    }

    let order = modify(db, feed, id, |order| {
        order.apply_transition(req.status, req.note.clone(), now)?;
        Ok(())
    })
    .await?;
    tracing::info!("Order {} is now {}", order.order_number, order.status);
    Ok(order)
}

pub async fn set_invoice_url(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Order>,
    id: OrderId,
    invoice_url: &str,
) -> AppResult<Order> {
    let url = invoice_url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(AppError::InvalidArgument(
            "Invoice URL must be an http(s) URL".into(),
        ));
    }
    modify(db, feed, id, |order| {
        order.invoice_url = Some(url.to_string());
        Ok(())
    })
    .await
}

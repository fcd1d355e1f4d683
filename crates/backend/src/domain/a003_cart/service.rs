//! Cart mutations.
//!
//! Every change is a read-modify-write of the user's cart row guarded by its
//! version: a write that finds a different version re-reads the cart and
//! applies the change again, a bounded number of times. Successful writes
//! are published on the cart change feed.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use contracts::domain::a001_product::ProductId;
use contracts::domain::a002_offer::OfferId;
use contracts::domain::a003_cart::{
    AddOfferRequest, AddProductRequest, Cart, CartOfferItem, CartProductItem,
};
use contracts::domain::common::AggregateRoot;
use sea_orm::DatabaseConnection;
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

use super::repository;
use crate::domain::a001_product::repository as products;
use crate::domain::a002_offer::repository as offers;
use crate::shared::error::{AppError, AppResult};
use crate::shared::realtime::ChangeFeed;

const MAX_ATTEMPTS: usize = 5;

/// Apply `change` to the stored cart and write it back. `change` returns
/// whether it modified the cart; unchanged carts are not written.
/// A missing cart is created when `create` is set, otherwise the call is a
/// no-op returning `None`.
async fn mutate<F>(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Cart>,
    user_id: &str,
    create: bool,
    mut change: F,
) -> AppResult<Option<Cart>>
where
    F: FnMut(&mut Cart, DateTime<Utc>) -> AppResult<bool>,
{
    for _ in 0..MAX_ATTEMPTS {
        let now = Utc::now();
        let (mut cart, is_new) = match repository::get(db, user_id).await? {
            Some(cart) => (cart, false),
            None if create => (Cart::new(user_id, now), true),
            None => return Ok(None),
        };

        let expected = cart.metadata.version;
        if !change(&mut cart, now)? {
            return Ok(Some(cart));
        }
        cart.before_write();

        let written = if is_new {
            repository::insert(db, &cart).await?
        } else {
            repository::update_if_version(db, &cart, expected).await?
        };
        if written {
            feed.publish(user_id, cart.clone());
            return Ok(Some(cart));
        }
        tracing::debug!("Cart of {} changed concurrently, retrying", user_id);
    }
    Err(AppError::FailedPrecondition(
        "Cart was modified concurrently, try again".into(),
    ))
}

/// `quantity` within `[min, max]`; `None` stands for an overflowed merge
fn check_quantity(name: &str, min: i32, max: i32, quantity: Option<i32>) -> AppResult<i32> {
    match quantity {
        Some(q) if (min..=max).contains(&q) => Ok(q),
        _ => Err(AppError::InvalidArgument(format!(
            "Quantity of '{}' must be between {} and {}",
            name, min, max
        ))),
    }
}

fn require_written(cart: Option<Cart>) -> AppResult<Cart> {
    cart.ok_or_else(|| AppError::Internal(anyhow!("cart missing after write")))
}

pub async fn get(db: &DatabaseConnection, user_id: &str) -> AppResult<Option<Cart>> {
    Ok(repository::get(db, user_id).await?)
}

pub async fn add_offer(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Cart>,
    user_id: &str,
    req: AddOfferRequest,
) -> AppResult<Cart> {
    if req.quantity < 1 {
        return Err(AppError::InvalidArgument("Quantity must be at least 1".into()));
    }
    let offer = offers::get_by_id(db, req.offer_id)
        .await?
        .ok_or_else(|| AppError::InvalidArgument(format!("Unknown offer {}", req.offer_id)))?;
    if !offer.is_purchasable(Utc::now()) {
        return Err(AppError::InvalidArgument(format!(
            "Offer '{}' is not available",
            offer.name
        )));
    }

    check_quantity(&offer.name, 1, offer.max_quantity, Some(req.quantity))?;

    let cart = mutate(db, feed, user_id, true, |cart, now| {
        let merged = cart.offer_quantity(offer.id).checked_add(req.quantity);
        check_quantity(&offer.name, offer.min_quantity, offer.max_quantity, merged)?;
        cart.add_offer(CartOfferItem::from_offer(&offer, req.quantity, now));
        Ok(true)
    })
    .await?;
    require_written(cart)
}

pub async fn add_product(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Cart>,
    user_id: &str,
    req: AddProductRequest,
) -> AppResult<Cart> {
    if req.quantity < 1 {
        return Err(AppError::InvalidArgument("Quantity must be at least 1".into()));
    }
    let product = products::get_by_id(db, req.product_id)
        .await?
        .ok_or_else(|| AppError::InvalidArgument(format!("Unknown product {}", req.product_id)))?;
    if !product.is_orderable() {
        return Err(AppError::InvalidArgument(format!(
            "Product '{}' is not available",
            product.name
        )));
    }

    check_quantity(&product.name, 1, product.max_quantity, Some(req.quantity))?;

    let cart = mutate(db, feed, user_id, true, |cart, now| {
        let merged = cart.product_quantity(product.id).checked_add(req.quantity);
        check_quantity(&product.name, product.min_quantity, product.max_quantity, merged)?;
        cart.add_product(CartProductItem::from_product(&product, req.quantity, now));
        Ok(true)
    })
    .await?;
    require_written(cart)
}

/// Set a line's quantity; zero or less removes it. No cart, no-op.
/// A positive quantity must lie within the offer's or product's limits.
pub async fn update_quantity(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Cart>,
    user_id: &str,
    item_id: Uuid,
    quantity: i32,
) -> AppResult<Option<Cart>> {
    let (offer, product) = if quantity > 0 {
        (
            offers::get_by_id(db, OfferId(item_id)).await?,
            products::get_by_id(db, ProductId(item_id)).await?,
        )
    } else {
        (None, None)
    };

    mutate(db, feed, user_id, false, |cart, _| {
        if quantity > 0 {
            let in_offers = cart.offers.iter().any(|o| o.offer_id.0 == item_id);
            let in_products = cart.products.iter().any(|p| p.product_id.0 == item_id);
            match (&offer, &product) {
                (Some(o), _) if in_offers => {
                    check_quantity(&o.name, o.min_quantity, o.max_quantity, Some(quantity))?;
                }
                (_, Some(p)) if in_products => {
                    check_quantity(&p.name, p.min_quantity, p.max_quantity, Some(quantity))?;
                }
                _ if in_offers || in_products => {
                    return Err(AppError::InvalidArgument(
                        "Item is no longer available, remove it from the cart".into(),
                    ));
                }
                _ => return Ok(false),
            }
        }
        Ok(cart.update_quantity(item_id, quantity))
    })
    .await
}

pub async fn remove(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Cart>,
    user_id: &str,
    item_id: Uuid,
) -> AppResult<Option<Cart>> {
    mutate(db, feed, user_id, false, |cart, _| Ok(cart.remove(item_id))).await
}

/// Drop the whole cart. Subscribers receive an empty cart.
pub async fn clear(db: &DatabaseConnection, feed: &ChangeFeed<Cart>, user_id: &str) -> AppResult<()> {
    if repository::delete(db, user_id).await? {
        feed.publish(user_id, Cart::new(user_id, Utc::now()));
    }
    Ok(())
}

/// Re-check every offer in the cart and record the ones that can no longer
/// be bought at `now`
pub async fn validate(
    db: &DatabaseConnection,
    feed: &ChangeFeed<Cart>,
    user_id: &str,
    now: DateTime<Utc>,
) -> AppResult<Option<Cart>> {
    let Some(current) = repository::get(db, user_id).await? else {
        return Ok(None);
    };
    let checked: Vec<OfferId> = current.offers.iter().map(|o| o.offer_id).collect();
    let purchasable: HashSet<OfferId> = offers::get_many(db, &checked)
        .await?
        .into_iter()
        .filter(|o| o.is_purchasable(now))
        .map(|o| o.id)
        .collect();

    mutate(db, feed, user_id, false, |cart, _| {
        let invalid: BTreeSet<OfferId> = cart
            .offers
            .iter()
            .map(|o| o.offer_id)
            .filter(|id| checked.contains(id) && !purchasable.contains(id))
            .collect();
        if invalid == cart.invalid_offer_ids && cart.has_invalid_items == !invalid.is_empty() {
            return Ok(false);
        }
        cart.mark_invalid_offers(invalid);
        Ok(true)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a001_product::service as product_service;
    use crate::domain::a002_offer::service as offer_service;
    use crate::shared::data::db::connect_in_memory;
    use chrono::Duration;
    use contracts::domain::a001_product::ProductId;

    const USER: &str = "user-1";

    #[tokio::test]
    async fn add_merge_update_and_remove() {
        let db = connect_in_memory().await.unwrap();
        let feed = ChangeFeed::new();
        let offer = offer_service::tests::published_offer(&db).await;
        let product = product_service::create(&db, product_service::tests::dto("Bananas", 250), None)
            .await
            .unwrap();

        add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: 1 })
            .await
            .unwrap();
        add_product(&db, &feed, USER, AddProductRequest { product_id: product.id, quantity: 2 })
            .await
            .unwrap();
        let cart = add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: 1 })
            .await
            .unwrap();

        assert_eq!(cart.offers.len(), 1);
        assert_eq!(cart.offers[0].quantity, 2);
        assert_eq!(cart.subtotal, 2 * 650 + 500);
        assert_eq!(cart.total_savings, 300);
        assert_eq!(cart.total, cart.subtotal);

        let cart = update_quantity(&db, &feed, USER, product.id.0, 3)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cart.products[0].total_price, 750);

        let cart = remove(&db, &feed, USER, offer.id.0).await.unwrap().unwrap();
        assert!(cart.offers.is_empty());
        assert_eq!(cart.subtotal, 750);
        assert_eq!(get(&db, USER).await.unwrap(), Some(cart));
    }

    #[tokio::test]
    async fn mutations_without_cart_are_noops() {
        let db = connect_in_memory().await.unwrap();
        let feed = ChangeFeed::new();
        let id = ProductId::new_v4().0;
        assert!(update_quantity(&db, &feed, USER, id, 2).await.unwrap().is_none());
        assert!(remove(&db, &feed, USER, id).await.unwrap().is_none());
        assert!(validate(&db, &feed, USER, Utc::now()).await.unwrap().is_none());
        assert!(get(&db, USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_unavailable_items_and_bad_quantities() {
        let db = connect_in_memory().await.unwrap();
        let feed = ChangeFeed::new();
        let offer = offer_service::tests::published_offer(&db).await;

        let err = add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: 11 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let err = add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let mut out_of_stock = product_service::tests::dto("Figs", 900);
        out_of_stock.in_stock = false;
        let product = product_service::create(&db, out_of_stock, None).await.unwrap();
        let err = add_product(&db, &feed, USER, AddProductRequest { product_id: product.id, quantity: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
        assert!(get(&db, USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_quantity_is_rejected_without_overflow() {
        let db = connect_in_memory().await.unwrap();
        let feed = ChangeFeed::new();
        let offer = offer_service::tests::published_offer(&db).await;
        add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: 1 })
            .await
            .unwrap();

        let err = add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: i32::MAX })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let product = product_service::create(&db, product_service::tests::dto("Oats", 120), None)
            .await
            .unwrap();
        let err = add_product(&db, &feed, USER, AddProductRequest { product_id: product.id, quantity: i32::MAX })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let cart = get(&db, USER).await.unwrap().unwrap();
        assert_eq!(cart.offer_quantity(offer.id), 1);
        assert!(cart.products.is_empty());
    }

    #[tokio::test]
    async fn update_quantity_respects_limits() {
        let db = connect_in_memory().await.unwrap();
        let feed = ChangeFeed::new();
        let offer = offer_service::tests::published_offer(&db).await;
        add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: 1 })
            .await
            .unwrap();

        let err = update_quantity(&db, &feed, USER, offer.id.0, 5000).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
        let cart = get(&db, USER).await.unwrap().unwrap();
        assert_eq!(cart.offer_quantity(offer.id), 1);

        let cart = update_quantity(&db, &feed, USER, offer.id.0, offer.max_quantity)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cart.offer_quantity(offer.id), offer.max_quantity);

        let cart = update_quantity(&db, &feed, USER, offer.id.0, 0).await.unwrap().unwrap();
        assert!(cart.offers.is_empty());
    }

    #[tokio::test]
    async fn validate_marks_deactivated_offers() {
        let db = connect_in_memory().await.unwrap();
        let feed = ChangeFeed::new();
        let offer = offer_service::tests::published_offer(&db).await;
        add_offer(&db, &feed, USER, AddOfferRequest { offer_id: offer.id, quantity: 1 })
            .await
            .unwrap();

        let cart = validate(&db, &feed, USER, Utc::now()).await.unwrap().unwrap();
        assert!(!cart.has_invalid_items);

        offer_service::deactivate(&db, offer.id).await.unwrap();
        let cart = validate(&db, &feed, USER, Utc::now() + Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        assert!(cart.has_invalid_items);
        assert!(cart.invalid_offer_ids.contains(&offer.id));

        let cart = remove(&db, &feed, USER, offer.id.0).await.unwrap().unwrap();
        assert!(!cart.has_invalid_items);
        assert!(cart.invalid_offer_ids.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_every_write() {
        let db = connect_in_memory().await.unwrap();
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe("client", USER);
        let product = product_service::create(&db, product_service::tests::dto("Kale", 199), None)
            .await
            .unwrap();

        add_product(&db, &feed, USER, AddProductRequest { product_id: product.id, quantity: 1 })
            .await
            .unwrap();
        let update = sub.recv().await.unwrap();
        assert_eq!(update.subtotal, 199);

        clear(&db, &feed, USER).await.unwrap();
        let update = sub.recv().await.unwrap();
        assert!(update.is_empty());
        assert!(get(&db, USER).await.unwrap().is_none());
    }
}

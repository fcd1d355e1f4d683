use chrono::{DateTime, Utc};
use contracts::domain::a002_offer::{Offer, OfferDto, OfferId, OfferProduct, OfferStatus};
use contracts::domain::common::AggregateRoot;
use sea_orm::DatabaseConnection;

use super::repository;
use crate::domain::a001_product::repository as products;
use crate::shared::error::{AppError, AppResult};

const MAX_ATTEMPTS: usize = 5;

/// Snapshot the referenced products at their current name and base price
async fn build_products(db: &DatabaseConnection, dto: &OfferDto) -> AppResult<Vec<OfferProduct>> {
    let mut snapshots = Vec::with_capacity(dto.products.len());
    for input in &dto.products {
        let product = products::get_by_id(db, input.product_id)
            .await?
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("Unknown product {}", input.product_id))
            })?;
        snapshots.push(OfferProduct::snapshot(&product, input.discounted_price));
    }
    Ok(snapshots)
}

/// Offers customers can buy at `now`
pub async fn list_public(db: &DatabaseConnection, now: DateTime<Utc>) -> AppResult<Vec<Offer>> {
    let offers = repository::list_by_status(db, OfferStatus::Active).await?;
    Ok(offers.into_iter().filter(|o| o.is_purchasable(now)).collect())
}

pub async fn get_public(db: &DatabaseConnection, id: OfferId, now: DateTime<Utc>) -> AppResult<Offer> {
    match repository::get_by_id(db, id).await? {
        Some(offer) if offer.is_purchasable(now) => Ok(offer),
        _ => Err(AppError::not_found(Offer::element_name())),
    }
}

pub async fn list_all(db: &DatabaseConnection) -> AppResult<Vec<Offer>> {
    Ok(repository::list_all(db).await?)
}

pub async fn get(db: &DatabaseConnection, id: OfferId) -> AppResult<Offer> {
    repository::get_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::not_found(Offer::element_name()))
}

/// New offers start as drafts
pub async fn create(db: &DatabaseConnection, dto: OfferDto, created_by: Option<String>) -> AppResult<Offer> {
    let snapshots = build_products(db, &dto).await?;
    let mut offer = Offer::new_for_insert(&dto, snapshots, created_by);
    offer.validate().map_err(AppError::InvalidArgument)?;
    offer.before_write();
    repository::insert(db, &offer).await?;
    tracing::info!(
        "Created offer {} ({}), savings {}%",
        offer.name,
        offer.id,
        offer.savings_percentage
    );
    Ok(offer)
}

/// Re-read, change and write back under the version check
async fn modify<F>(db: &DatabaseConnection, id: OfferId, mut change: F) -> AppResult<Offer>
where
    F: FnMut(&mut Offer) -> AppResult<()>,
{
    for _ in 0..MAX_ATTEMPTS {
        let mut offer = get(db, id).await?;
        let expected = offer.metadata.version;
        change(&mut offer)?;
        offer.before_write();
        if repository::update_if_version(db, &offer, expected).await? {
            return Ok(offer);
        }
    }
    Err(AppError::FailedPrecondition(
        "Offer was modified concurrently, try again".into(),
    ))
}

pub async fn update(db: &DatabaseConnection, id: OfferId, dto: OfferDto) -> AppResult<Offer> {
    let snapshots = build_products(db, &dto).await?;
    modify(db, id, |offer| {
        offer.update(&dto, snapshots.clone());
        offer.validate().map_err(AppError::InvalidArgument)
    })
    .await
}

pub async fn publish(db: &DatabaseConnection, id: OfferId, now: DateTime<Utc>) -> AppResult<Offer> {
    let offer = modify(db, id, |offer| {
        offer.publish(now).map_err(AppError::FailedPrecondition)
    })
    .await?;
    tracing::info!("Published offer {}", offer.id);
    Ok(offer)
}

pub async fn deactivate(db: &DatabaseConnection, id: OfferId) -> AppResult<Offer> {
    modify(db, id, |offer| {
        offer.deactivate();
        Ok(())
    })
    .await
}

pub async fn delete(db: &DatabaseConnection, id: OfferId, confirm: bool) -> AppResult<()> {
    if !confirm {
        return Err(AppError::FailedPrecondition(
            "Deleting an offer must be confirmed".into(),
        ));
    }
    if !repository::delete(db, id).await? {
        return Err(AppError::not_found(Offer::element_name()));
    }
    tracing::info!("Deleted offer {}", id);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::a001_product::service as product_service;
    use crate::shared::data::db::connect_in_memory;
    use chrono::Duration;
    use contracts::domain::a002_offer::OfferProductInput;

    /// Active offer of two products: 500 + 300 discounted to 400 + 250
    pub(crate) async fn published_offer(db: &DatabaseConnection) -> Offer {
        let a = product_service::create(db, product_service::tests::dto("Milk", 500), None)
            .await
            .unwrap();
        let b = product_service::create(db, product_service::tests::dto("Cereal", 300), None)
            .await
            .unwrap();
        let offer = create(
            db,
            OfferDto {
                name: "Breakfast".into(),
                products: vec![
                    OfferProductInput {
                        product_id: a.id,
                        discounted_price: 400,
                    },
                    OfferProductInput {
                        product_id: b.id,
                        discounted_price: 250,
                    },
                ],
                ..OfferDto::default()
            },
            None,
        )
        .await
        .unwrap();
        publish(db, offer.id, Utc::now()).await.unwrap()
    }

    #[tokio::test]
    async fn offer_lifecycle() {
        let db = connect_in_memory().await.unwrap();
        let offer = published_offer(&db).await;
        assert_eq!(offer.status, OfferStatus::Active);
        assert_eq!(offer.original_total, 800);
        assert_eq!(offer.discounted_total, 650);
        assert_eq!(offer.total_savings, 150);
        assert!(offer.published_at.is_some());

        let now = Utc::now();
        assert_eq!(list_public(&db, now).await.unwrap().len(), 1);

        let err = publish(&db, offer.id, now).await.unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(_)));

        let inactive = deactivate(&db, offer.id).await.unwrap();
        assert_eq!(inactive.status, OfferStatus::Inactive);
        assert!(list_public(&db, now).await.unwrap().is_empty());
        assert!(matches!(get_public(&db, offer.id, now).await, Err(AppError::NotFound(_))));

        delete(&db, offer.id, true).await.unwrap();
        assert!(matches!(get(&db, offer.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_offer_is_not_public() {
        let db = connect_in_memory().await.unwrap();
        let offer = published_offer(&db).await;
        let after = Utc::now() + Duration::days(2);
        let mut dto = OfferDto {
            name: offer.name.clone(),
            products: offer
                .products
                .iter()
                .map(|p| OfferProductInput {
                    product_id: p.product_id,
                    discounted_price: p.discounted_price,
                })
                .collect(),
            ..OfferDto::default()
        };
        dto.valid_until = Some(Utc::now() + Duration::days(1));
        update(&db, offer.id, dto).await.unwrap();

        assert!(list_public(&db, after).await.unwrap().is_empty());
        assert_eq!(list_public(&db, Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_product_and_bad_price_are_rejected() {
        let db = connect_in_memory().await.unwrap();
        let err = create(
            &db,
            OfferDto {
                name: "Ghost".into(),
                products: vec![OfferProductInput {
                    product_id: contracts::domain::a001_product::ProductId::new_v4(),
                    discounted_price: 1,
                }],
                ..OfferDto::default()
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let product = product_service::create(&db, product_service::tests::dto("Eggs", 200), None)
            .await
            .unwrap();
        let err = create(
            &db,
            OfferDto {
                name: "Pricey".into(),
                products: vec![OfferProductInput {
                    product_id: product.id,
                    discounted_price: 250,
                }],
                ..OfferDto::default()
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }
}

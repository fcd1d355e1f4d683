use contracts::domain::a001_product::{Product, ProductDto, ProductId, ProductStatus};
use contracts::domain::common::AggregateRoot;
use sea_orm::DatabaseConnection;

use super::repository;
use crate::shared::error::{AppError, AppResult};

const MAX_ATTEMPTS: usize = 5;

/// Active products, grouped by category
pub async fn list_public(db: &DatabaseConnection) -> AppResult<Vec<Product>> {
    Ok(repository::list_by_status(db, ProductStatus::Active).await?)
}

/// A product visible to customers; inactive ones read as missing
pub async fn get_public(db: &DatabaseConnection, id: ProductId) -> AppResult<Product> {
    match repository::get_by_id(db, id).await? {
        Some(p) if p.status == ProductStatus::Active => Ok(p),
        _ => Err(AppError::not_found(Product::element_name())),
    }
}

pub async fn list_all(db: &DatabaseConnection) -> AppResult<Vec<Product>> {
    Ok(repository::list_all(db).await?)
}

pub async fn get(db: &DatabaseConnection, id: ProductId) -> AppResult<Product> {
    repository::get_by_id(db, id)
        .await?
        .ok_or_else(|| AppError::not_found(Product::element_name()))
}

pub async fn create(
    db: &DatabaseConnection,
    dto: ProductDto,
    created_by: Option<String>,
) -> AppResult<Product> {
    let mut product = Product::new_for_insert(&dto, created_by);
    product.validate().map_err(AppError::InvalidArgument)?;
    product.before_write();
    repository::insert(db, &product).await?;
    tracing::info!("Created product {} ({})", product.name, product.id);
    Ok(product)
}

pub async fn update(db: &DatabaseConnection, id: ProductId, dto: ProductDto) -> AppResult<Product> {
    for _ in 0..MAX_ATTEMPTS {
        let mut product = get(db, id).await?;
        let expected = product.metadata.version;
        product.update(&dto);
        product.validate().map_err(AppError::InvalidArgument)?;
        product.before_write();
        if repository::update_if_version(db, &product, expected).await? {
            return Ok(product);
        }
    }
    Err(AppError::FailedPrecondition(
        "Product was modified concurrently, try again".into(),
    ))
}

/// Permanently remove a product. Existing offers keep their snapshot.
pub async fn delete(db: &DatabaseConnection, id: ProductId, confirm: bool) -> AppResult<()> {
    if !confirm {
        return Err(AppError::FailedPrecondition(
            "Deleting a product must be confirmed".into(),
        ));
    }
    if !repository::delete(db, id).await? {
        return Err(AppError::not_found(Product::element_name()));
    }
    tracing::info!("Deleted product {}", id);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;

    pub(crate) fn dto(name: &str, price: i64) -> ProductDto {
        ProductDto {
            name: name.into(),
            base_price: price,
            category: "produce".into(),
            tags: vec![" Fresh ".into()],
            in_stock: true,
            ..ProductDto::default()
        }
    }

    #[tokio::test]
    async fn create_update_delete() {
        let db = connect_in_memory().await.unwrap();
        let created = create(&db, dto("Apples", 300), Some("admin".into())).await.unwrap();
        assert_eq!(created.metadata.version, 1);

        let stored = get(&db, created.id).await.unwrap();
        assert!(stored.tags.contains("fresh"));
        assert_eq!(stored.min_quantity, 1);

        let updated = update(&db, created.id, dto("Green Apples", 350)).await.unwrap();
        assert_eq!(updated.metadata.version, 2);
        assert_eq!(get(&db, created.id).await.unwrap().base_price, 350);

        let err = delete(&db, created.id, false).await.unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(_)));
        delete(&db, created.id, true).await.unwrap();
        assert!(matches!(get(&db, created.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_product_is_rejected() {
        let db = connect_in_memory().await.unwrap();
        let err = create(&db, dto("  ", 100), None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn public_listing_hides_inactive_products() {
        let db = connect_in_memory().await.unwrap();
        let visible = create(&db, dto("Bread", 250), None).await.unwrap();
        let mut hidden_dto = dto("Old Bread", 100);
        hidden_dto.status = ProductStatus::Inactive;
        let hidden = create(&db, hidden_dto, None).await.unwrap();

        let listed = list_public(&db).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, visible.id);
        assert!(matches!(get_public(&db, hidden.id).await, Err(AppError::NotFound(_))));
        assert_eq!(list_all(&db).await.unwrap().len(), 2);
    }
}

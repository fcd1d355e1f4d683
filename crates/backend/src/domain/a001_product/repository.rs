use chrono::{DateTime, Utc};
use contracts::domain::a001_product::{Product, ProductId, ProductStatus};
use contracts::domain::common::{AggregateId, EntityMetadata};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_price: i64,
    pub category: String,
    /// JSON array
    pub tags: String,
    pub min_quantity: i32,
    pub max_quantity: i32,
    pub in_stock: bool,
    pub status: String,
    pub image_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Product {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        let id = ProductId::from_string(&m.id)
            .map_err(|e| anyhow::anyhow!("Bad product id {}: {}", m.id, e))?;
        Ok(Product {
            id,
            name: m.name,
            description: m.description,
            base_price: m.base_price,
            category: m.category,
            tags: serde_json::from_str(&m.tags)?,
            min_quantity: m.min_quantity,
            max_quantity: m.max_quantity,
            in_stock: m.in_stock,
            status: ProductStatus::from_code(&m.status).unwrap_or(ProductStatus::Inactive),
            image_url: m.image_url,
            created_by: m.created_by,
            metadata: EntityMetadata {
                created_at: m.created_at,
                updated_at: m.updated_at,
                version: m.version,
            },
        })
    }
}

fn to_active(product: &Product) -> anyhow::Result<ActiveModel> {
    Ok(ActiveModel {
        id: Set(product.id.as_string()),
        name: Set(product.name.clone()),
        description: Set(product.description.clone()),
        base_price: Set(product.base_price),
        category: Set(product.category.clone()),
        tags: Set(serde_json::to_string(&product.tags)?),
        min_quantity: Set(product.min_quantity),
        max_quantity: Set(product.max_quantity),
        in_stock: Set(product.in_stock),
        status: Set(product.status.code().to_string()),
        image_url: Set(product.image_url.clone()),
        created_by: Set(product.created_by.clone()),
        created_at: Set(product.metadata.created_at),
        updated_at: Set(product.metadata.updated_at),
        version: Set(product.metadata.version),
    })
}

fn collect(models: Vec<Model>) -> anyhow::Result<Vec<Product>> {
    models.into_iter().map(Product::try_from).collect()
}

pub async fn list_all<C: ConnectionTrait>(conn: &C) -> anyhow::Result<Vec<Product>> {
    collect(Entity::find().order_by_asc(Column::Name).all(conn).await?)
}

pub async fn list_by_status<C: ConnectionTrait>(
    conn: &C,
    status: ProductStatus,
) -> anyhow::Result<Vec<Product>> {
    collect(
        Entity::find()
            .filter(Column::Status.eq(status.code()))
            .order_by_asc(Column::Category)
            .order_by_asc(Column::Name)
            .all(conn)
            .await?,
    )
}

pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: ProductId) -> anyhow::Result<Option<Product>> {
    Entity::find_by_id(id.as_string())
        .one(conn)
        .await?
        .map(Product::try_from)
        .transpose()
}

pub async fn insert<C: ConnectionTrait>(conn: &C, product: &Product) -> anyhow::Result<()> {
    to_active(product)?.insert(conn).await?;
    Ok(())
}

/// Write `product` only if the stored row is still at `expected_version`
pub async fn update_if_version<C: ConnectionTrait>(
    conn: &C,
    product: &Product,
    expected_version: i32,
) -> anyhow::Result<bool> {
    let mut active = to_active(product)?;
    active.id = sea_orm::ActiveValue::NotSet;
    active.created_at = sea_orm::ActiveValue::NotSet;
    let result = Entity::update_many()
        .set(active)
        .filter(Column::Id.eq(product.id.as_string()))
        .filter(Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

pub async fn delete<C: ConnectionTrait>(conn: &C, id: ProductId) -> anyhow::Result<bool> {
    let result = Entity::delete_by_id(id.as_string()).exec(conn).await?;
    Ok(result.rows_affected > 0)
}

use chrono::{DateTime, Utc};
use contracts::domain::a003_cart::Cart;
use contracts::domain::common::EntityMetadata;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub offers: String,
    pub products: String,
    pub subtotal: i64,
    pub total_savings: i64,
    pub total: i64,
    pub has_invalid_items: bool,
    pub invalid_offer_ids: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Cart {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        Ok(Cart {
            user_id: m.user_id,
            offers: serde_json::from_str(&m.offers)?,
            products: serde_json::from_str(&m.products)?,
            subtotal: m.subtotal,
            total_savings: m.total_savings,
            total: m.total,
            has_invalid_items: m.has_invalid_items,
            invalid_offer_ids: serde_json::from_str(&m.invalid_offer_ids)?,
            metadata: EntityMetadata {
                created_at: m.created_at,
                updated_at: m.updated_at,
                version: m.version,
            },
        })
    }
}

fn to_active(cart: &Cart) -> anyhow::Result<ActiveModel> {
    Ok(ActiveModel {
        user_id: Set(cart.user_id.clone()),
        offers: Set(serde_json::to_string(&cart.offers)?),
        products: Set(serde_json::to_string(&cart.products)?),
        subtotal: Set(cart.subtotal),
        total_savings: Set(cart.total_savings),
        total: Set(cart.total),
        has_invalid_items: Set(cart.has_invalid_items),
        invalid_offer_ids: Set(serde_json::to_string(&cart.invalid_offer_ids)?),
        created_at: Set(cart.metadata.created_at),
        updated_at: Set(cart.metadata.updated_at),
        version: Set(cart.metadata.version),
    })
}

pub async fn get<C: ConnectionTrait>(conn: &C, user_id: &str) -> anyhow::Result<Option<Cart>> {
    Entity::find_by_id(user_id.to_string())
        .one(conn)
        .await?
        .map(Cart::try_from)
        .transpose()
}

/// Create the cart. Returns false when one already exists for the user.
pub async fn insert<C: ConnectionTrait>(conn: &C, cart: &Cart) -> anyhow::Result<bool> {
    let inserted = Entity::insert(to_active(cart)?)
        .on_conflict(OnConflict::column(Column::UserId).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;
    Ok(inserted == 1)
}

/// Write `cart` only if the stored row is still at `expected_version`
pub async fn update_if_version<C: ConnectionTrait>(
    conn: &C,
    cart: &Cart,
    expected_version: i32,
) -> anyhow::Result<bool> {
    let mut active = to_active(cart)?;
    active.user_id = sea_orm::ActiveValue::NotSet;
    active.created_at = sea_orm::ActiveValue::NotSet;
    let result = Entity::update_many()
        .set(active)
        .filter(Column::UserId.eq(cart.user_id.as_str()))
        .filter(Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

pub async fn delete<C: ConnectionTrait>(conn: &C, user_id: &str) -> anyhow::Result<bool> {
    let result = Entity::delete_by_id(user_id.to_string()).exec(conn).await?;
    Ok(result.rows_affected > 0)
}

/// Delete the cart only if nobody changed it since `expected_version` was read
pub async fn delete_if_version<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    expected_version: i32,
) -> anyhow::Result<bool> {
    let result = Entity::delete_many()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use contracts::domain::common::AggregateRoot;

    #[tokio::test]
    async fn stale_version_neither_updates_nor_deletes() {
        let db = connect_in_memory().await.unwrap();
        let mut cart = Cart::new("user-1", Utc::now());
        assert!(insert(&db, &cart).await.unwrap());
        assert!(!insert(&db, &cart).await.unwrap());

        let stored = cart.metadata.version;
        cart.before_write();
        assert!(update_if_version(&db, &cart, stored).await.unwrap());

        let mut stale = cart.clone();
        stale.subtotal = 999;
        stale.before_write();
        assert!(!update_if_version(&db, &stale, stored).await.unwrap());
        assert!(!delete_if_version(&db, "user-1", stored).await.unwrap());

        assert_eq!(get(&db, "user-1").await.unwrap(), Some(cart.clone()));
        assert!(delete_if_version(&db, "user-1", cart.metadata.version).await.unwrap());
        assert!(get(&db, "user-1").await.unwrap().is_none());
    }
}

use chrono::{DateTime, Utc};
use contracts::domain::a002_offer::{Offer, OfferId, OfferStatus};
use contracts::domain::common::{AggregateId, EntityMetadata};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "offers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON array of product snapshots
    pub products: String,
    pub original_total: i64,
    pub discounted_total: i64,
    pub total_savings: i64,
    pub savings_percentage: f64,
    pub min_quantity: i32,
    pub max_quantity: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub status: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Offer {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        let id = OfferId::from_string(&m.id)
            .map_err(|e| anyhow::anyhow!("Bad offer id {}: {}", m.id, e))?;
        Ok(Offer {
            id,
            name: m.name,
            description: m.description,
            products: serde_json::from_str(&m.products)?,
            original_total: m.original_total,
            discounted_total: m.discounted_total,
            total_savings: m.total_savings,
            savings_percentage: m.savings_percentage,
            min_quantity: m.min_quantity,
            max_quantity: m.max_quantity,
            valid_from: m.valid_from,
            valid_until: m.valid_until,
            status: OfferStatus::from_code(&m.status).unwrap_or(OfferStatus::Inactive),
            published_at: m.published_at,
            created_by: m.created_by,
            metadata: EntityMetadata {
                created_at: m.created_at,
                updated_at: m.updated_at,
                version: m.version,
            },
        })
    }
}

fn to_active(offer: &Offer) -> anyhow::Result<ActiveModel> {
    Ok(ActiveModel {
        id: Set(offer.id.as_string()),
        name: Set(offer.name.clone()),
        description: Set(offer.description.clone()),
        products: Set(serde_json::to_string(&offer.products)?),
        original_total: Set(offer.original_total),
        discounted_total: Set(offer.discounted_total),
        total_savings: Set(offer.total_savings),
        savings_percentage: Set(offer.savings_percentage),
        min_quantity: Set(offer.min_quantity),
        max_quantity: Set(offer.max_quantity),
        valid_from: Set(offer.valid_from),
        valid_until: Set(offer.valid_until),
        status: Set(offer.status.code().to_string()),
        published_at: Set(offer.published_at),
        created_by: Set(offer.created_by.clone()),
        created_at: Set(offer.metadata.created_at),
        updated_at: Set(offer.metadata.updated_at),
        version: Set(offer.metadata.version),
    })
}

fn collect(models: Vec<Model>) -> anyhow::Result<Vec<Offer>> {
    models.into_iter().map(Offer::try_from).collect()
}

pub async fn list_all<C: ConnectionTrait>(conn: &C) -> anyhow::Result<Vec<Offer>> {
    collect(
        Entity::find()
            .order_by_desc(Column::CreatedAt)
            .all(conn)
            .await?,
    )
}

pub async fn list_by_status<C: ConnectionTrait>(
    conn: &C,
    status: OfferStatus,
) -> anyhow::Result<Vec<Offer>> {
    collect(
        Entity::find()
            .filter(Column::Status.eq(status.code()))
            .order_by_desc(Column::CreatedAt)
            .all(conn)
            .await?,
    )
}

pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: OfferId) -> anyhow::Result<Option<Offer>> {
    Entity::find_by_id(id.as_string())
        .one(conn)
        .await?
        .map(Offer::try_from)
        .transpose()
}

pub async fn get_many<C: ConnectionTrait>(conn: &C, ids: &[OfferId]) -> anyhow::Result<Vec<Offer>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let keys: Vec<String> = ids.iter().map(|id| id.as_string()).collect();
    collect(Entity::find().filter(Column::Id.is_in(keys)).all(conn).await?)
}

pub async fn insert<C: ConnectionTrait>(conn: &C, offer: &Offer) -> anyhow::Result<()> {
    to_active(offer)?.insert(conn).await?;
    Ok(())
}

/// Write `offer` only if the stored row is still at `expected_version`
pub async fn update_if_version<C: ConnectionTrait>(
    conn: &C,
    offer: &Offer,
    expected_version: i32,
) -> anyhow::Result<bool> {
    let mut active = to_active(offer)?;
    active.id = sea_orm::ActiveValue::NotSet;
    active.created_at = sea_orm::ActiveValue::NotSet;
    let result = Entity::update_many()
        .set(active)
        .filter(Column::Id.eq(offer.id.as_string()))
        .filter(Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

pub async fn delete<C: ConnectionTrait>(conn: &C, id: OfferId) -> anyhow::Result<bool> {
    let result = Entity::delete_by_id(id.as_string()).exec(conn).await?;
    Ok(result.rows_affected > 0)
}

use anyhow::Context;
use chrono::{DateTime, Utc};
use contracts::domain::a004_order::{
    DeliveryDetails, FulfillmentMethod, Order, OrderId, OrderListFilter, OrderStatus,
    PickupDetails,
};
use contracts::domain::common::{AggregateId, EntityMetadata};
use sea_orm::entity::prelude::*;
use sea_orm::{ConnectionTrait, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub offers: String,
    pub products: String,
    pub subtotal: i64,
    pub total_savings: i64,
    pub delivery_fee: i64,
    pub tax: i64,
    pub total: i64,
    pub fulfillment_method: String,
    pub delivery_details: Option<String>,
    pub pickup_details: Option<String>,
    pub status: String,
    pub status_history: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

const DEFAULT_PAGE: u64 = 50;
const MAX_PAGE: u64 = 200;

impl TryFrom<Model> for Order {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        let id = OrderId::from_string(&m.id)
            .map_err(|e| anyhow::anyhow!("Bad order id {}: {}", m.id, e))?;
        let status = OrderStatus::from_code(&m.status)
            .with_context(|| format!("Unknown status '{}' on order {}", m.status, m.id))?;
        let fulfillment_method = FulfillmentMethod::from_code(&m.fulfillment_method)
            .with_context(|| format!("Unknown fulfillment method on order {}", m.id))?;
        Ok(Order {
            id,
            order_number: m.order_number,
            user_id: m.user_id,
            customer_name: m.customer_name,
            customer_email: m.customer_email,
            customer_phone: m.customer_phone,
            offers: serde_json::from_str(&m.offers)?,
            products: serde_json::from_str(&m.products)?,
            subtotal: m.subtotal,
            total_savings: m.total_savings,
            delivery_fee: m.delivery_fee,
            tax: m.tax,
            total: m.total,
            fulfillment_method,
            delivery_details: m
                .delivery_details
                .as_deref()
                .map(serde_json::from_str::<DeliveryDetails>)
                .transpose()?,
            pickup_details: m
                .pickup_details
                .as_deref()
                .map(serde_json::from_str::<PickupDetails>)
                .transpose()?,
            status,
            status_history: serde_json::from_str(&m.status_history)?,
            completed_at: m.completed_at,
            invoice_url: m.invoice_url,
            notes: m.notes,
            metadata: EntityMetadata {
                created_at: m.created_at,
                updated_at: m.updated_at,
                version: m.version,
            },
        })
    }
}

fn to_active(order: &Order) -> anyhow::Result<ActiveModel> {
    Ok(ActiveModel {
        id: Set(order.id.as_string()),
        order_number: Set(order.order_number.clone()),
        user_id: Set(order.user_id.clone()),
        customer_name: Set(order.customer_name.clone()),
        customer_email: Set(order.customer_email.clone()),
        customer_phone: Set(order.customer_phone.clone()),
        offers: Set(serde_json::to_string(&order.offers)?),
        products: Set(serde_json::to_string(&order.products)?),
        subtotal: Set(order.subtotal),
        total_savings: Set(order.total_savings),
        delivery_fee: Set(order.delivery_fee),
        tax: Set(order.tax),
        total: Set(order.total),
        fulfillment_method: Set(order.fulfillment_method.code().to_string()),
        delivery_details: Set(order.delivery_details.as_ref().map(serde_json::to_string).transpose()?),
        pickup_details: Set(order.pickup_details.as_ref().map(serde_json::to_string).transpose()?),
        status: Set(order.status.code().to_string()),
        status_history: Set(serde_json::to_string(&order.status_history)?),
        completed_at: Set(order.completed_at),
        invoice_url: Set(order.invoice_url.clone()),
        notes: Set(order.notes.clone()),
        created_at: Set(order.metadata.created_at),
        updated_at: Set(order.metadata.updated_at),
        version: Set(order.metadata.version),
    })
}

fn collect(models: Vec<Model>) -> anyhow::Result<Vec<Order>> {
    models.into_iter().map(Order::try_from).collect()
}

pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: OrderId) -> anyhow::Result<Option<Order>> {
    Entity::find_by_id(id.as_string())
        .one(conn)
        .await?
        .map(Order::try_from)
        .transpose()
}

/// Newest first, optionally filtered by status and fulfillment method
pub async fn list<C: ConnectionTrait>(conn: &C, filter: &OrderListFilter) -> anyhow::Result<Vec<Order>> {
    let mut query = Entity::find();
    if let Some(status) = filter.status {
        query = query.filter(Column::Status.eq(status.code()));
    }
    if let Some(method) = filter.fulfillment_method {
        query = query.filter(Column::FulfillmentMethod.eq(method.code()));
    }
    let models = query
        .order_by_desc(Column::CreatedAt)
        .limit(filter.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE))
        .offset(filter.offset.unwrap_or(0))
        .all(conn)
        .await?;
    collect(models)
}

pub async fn list_by_user<C: ConnectionTrait>(conn: &C, user_id: &str) -> anyhow::Result<Vec<Order>> {
    collect(
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .all(conn)
            .await?,
    )
}

pub async fn insert<C: ConnectionTrait>(conn: &C, order: &Order) -> anyhow::Result<()> {
    to_active(order)?.insert(conn).await?;
    Ok(())
}

/// Write `order` only if the stored row is still at `expected_version`
pub async fn update_if_version<C: ConnectionTrait>(
    conn: &C,
    order: &Order,
    expected_version: i32,
) -> anyhow::Result<bool> {
    let mut active = to_active(order)?;
    active.id = sea_orm::ActiveValue::NotSet;
    active.created_at = sea_orm::ActiveValue::NotSet;
    let result = Entity::update_many()
        .set(active)
        .filter(Column::Id.eq(order.id.as_string()))
        .filter(Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

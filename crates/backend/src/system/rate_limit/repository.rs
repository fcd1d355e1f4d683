use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ConnectionTrait, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_limits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// JSON array of request times in epoch milliseconds
    pub timestamps: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Stored window of one `prefix:identifier` key
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRecord {
    pub key: String,
    pub timestamps: Vec<i64>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl TryFrom<Model> for RateLimitRecord {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            timestamps: serde_json::from_str(&m.timestamps)?,
            key: m.key,
            updated_at: m.updated_at,
            version: m.version,
        })
    }
}

pub async fn find<C: ConnectionTrait>(conn: &C, key: &str) -> anyhow::Result<Option<RateLimitRecord>> {
    Entity::find_by_id(key.to_string())
        .one(conn)
        .await?
        .map(RateLimitRecord::try_from)
        .transpose()
}

/// Insert a fresh record. Returns false when another writer created the key first.
pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    timestamps: &[i64],
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let active = ActiveModel {
        key: Set(key.to_string()),
        timestamps: Set(serde_json::to_string(timestamps)?),
        created_at: Set(now),
        updated_at: Set(now),
        version: Set(0),
    };
    let inserted = Entity::insert(active)
        .on_conflict(OnConflict::column(Column::Key).do_nothing().to_owned())
        .exec_without_returning(conn)
        .await?;
    Ok(inserted == 1)
}

/// Replace the window only if the stored version still equals `expected_version`
pub async fn compare_and_swap<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    timestamps: &[i64],
    now: DateTime<Utc>,
    expected_version: i32,
) -> anyhow::Result<bool> {
    let result = Entity::update_many()
        .col_expr(Column::Timestamps, Expr::value(serde_json::to_string(timestamps)?))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .col_expr(Column::Version, Expr::value(expected_version + 1))
        .filter(Column::Key.eq(key))
        .filter(Column::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Delete up to `limit` records last touched before `cutoff`
pub async fn delete_stale<C: ConnectionTrait>(
    conn: &C,
    cutoff: DateTime<Utc>,
    limit: u64,
) -> anyhow::Result<u64> {
    let keys: Vec<String> = Entity::find()
        .select_only()
        .column(Column::Key)
        .filter(Column::UpdatedAt.lt(cutoff))
        .order_by_asc(Column::UpdatedAt)
        .limit(limit)
        .into_tuple()
        .all(conn)
        .await?;
    if keys.is_empty() {
        return Ok(0);
    }

    let result = Entity::delete_many()
        .filter(Column::Key.is_in(keys))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

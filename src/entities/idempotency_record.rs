use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Completed-operation marker for replay-safe admin actions and client
/// retries. One logical operation writes exactly one row, keyed by
/// (idempotency_key, user_id, operation); later calls with the same key
/// replay the stored response instead of re-executing.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "idempotency_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub idempotency_key: String,
    pub user_id: Uuid,
    pub operation: String,
    pub request_hash: String,
    pub completed: bool,
    #[sea_orm(column_type = "Json", nullable)]
    pub response: Option<Json>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

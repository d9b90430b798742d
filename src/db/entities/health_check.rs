use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "health_checks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub api_id: i32,
    pub checked_at: ChronoDateTimeUtc,
    pub http_status: Option<i32>,
    pub response_time_ms: i32,
    pub is_up: bool,
    #[sea_orm(column_type = "String(StringLen::N(500))", nullable)]
    pub error_message: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
    pub response_hash: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tracked_api::Entity",
        from = "Column::ApiId",
        to = "super::tracked_api::Column::Id",
        on_delete = "Cascade"
    )]
    TrackedApi,
}

impl Related<super::tracked_api::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TrackedApi.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

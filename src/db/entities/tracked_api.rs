use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::{ApiStatus, HttpMethod};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tracked_apis")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub api_name: String,
    pub base_url: String,
    pub documentation_url: Option<String>,
    pub health_check_url: Option<String>,
    pub http_method: HttpMethod,
    pub expected_status: i32,
    pub check_interval: i32,
    pub current_status: ApiStatus,
    pub last_checked: Option<ChronoDateTimeUtc>,
    pub next_check_at: Option<ChronoDateTimeUtc>,
    pub is_active: bool,
    pub consecutive_failures: i32,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::health_check::Entity")]
    HealthCheck,
    #[sea_orm(has_many = "super::alert::Entity")]
    Alert,
}

impl Related<super::health_check::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HealthCheck.def()
    }
}

impl Related<super::alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alert.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Database-backed store built on sea-orm.
//!
//! The outcome of a check (API row, health check, alert) is written inside one
//! transaction so status, history and alerts never drift apart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Alias, Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Schema, Select, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::info;

use crate::db::entities::{alert, health_check, tracked_api};
use crate::db::enums::{ApiStatus, HttpMethod};
use crate::db::error::StoreError;
use crate::db::models::{
    Alert, AlertFilter, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_EXPECTED_STATUS, HealthCheck,
    INITIAL_CHECK_DELAY_SECS, NewAlert, NewHealthCheck, NewTrackedApi, Page, PageParams,
    RuntimeUpdate, TrackedApi,
};
use crate::db::store::{AlertStore, CheckRecorder, HealthCheckStore, TrackedApiStore};

#[derive(Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(database_url.to_owned());
        opt.max_connections(max_connections).sqlx_logging(false);
        let db = Database::connect(opt).await?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Creates the monitoring tables when they do not exist yet.
    pub async fn sync_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let statements = [
            schema
                .create_table_from_entity(tracked_api::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(health_check::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(alert::Entity)
                .if_not_exists()
                .to_owned(),
        ];
        for statement in statements {
            self.db.execute(backend.build(&statement)).await?;
        }
        info!("Monitoring schema is in place.");
        Ok(())
    }

    async fn update_api<C: ConnectionTrait>(conn: &C, api: &TrackedApi) -> Result<(), StoreError> {
        let active = api.clone().into_active_model().reset_all();
        match active.update(conn).await {
            Ok(_) => Ok(()),
            Err(DbErr::RecordNotUpdated) => {
                Err(StoreError::NotFound(format!("tracked api {}", api.id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the runtime columns only, guarded on the prior status and failure count.
    async fn update_runtime<C: ConnectionTrait>(
        conn: &C,
        update: &RuntimeUpdate,
    ) -> Result<(), StoreError> {
        let result = tracked_api::Entity::update_many()
            .col_expr(
                tracked_api::Column::CurrentStatus,
                Expr::value(update.current_status),
            )
            .col_expr(
                tracked_api::Column::ConsecutiveFailures,
                Expr::value(update.consecutive_failures),
            )
            .col_expr(
                tracked_api::Column::LastChecked,
                Expr::value(Some(update.last_checked)),
            )
            .col_expr(
                tracked_api::Column::NextCheckAt,
                Expr::value(Some(update.next_check_at)),
            )
            .filter(tracked_api::Column::Id.eq(update.api_id))
            .filter(tracked_api::Column::CurrentStatus.eq(update.prior_status))
            .filter(tracked_api::Column::ConsecutiveFailures.eq(update.prior_failures))
            .exec(conn)
            .await?;
        if result.rows_affected > 0 {
            return Ok(());
        }

        match tracked_api::Entity::find_by_id(update.api_id).one(conn).await? {
            Some(_) => Err(StoreError::Conflict(format!(
                "tracked api {} changed while it was being checked",
                update.api_id
            ))),
            None => Err(StoreError::NotFound(format!("tracked api {}", update.api_id))),
        }
    }

    async fn insert_check<C: ConnectionTrait>(
        conn: &C,
        check: NewHealthCheck,
    ) -> Result<HealthCheck, DbErr> {
        health_check::ActiveModel {
            api_id: Set(check.api_id),
            checked_at: Set(check.checked_at),
            http_status: Set(check.http_status),
            response_time_ms: Set(check.response_time_ms),
            is_up: Set(check.is_up),
            error_message: Set(check.error_message),
            response_hash: Set(check.response_hash),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    async fn insert_alert<C: ConnectionTrait>(conn: &C, new: NewAlert) -> Result<Alert, DbErr> {
        alert::ActiveModel {
            api_id: Set(new.api_id),
            user_id: Set(new.user_id),
            alert_type: Set(new.alert_type),
            severity: Set(new.severity),
            title: Set(new.title),
            description: Set(new.description),
            is_resolved: Set(false),
            resolved_at: Set(None),
            created_at: Set(new.created_at),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    fn checks_since(api_id: i32, since: DateTime<Utc>) -> Select<health_check::Entity> {
        health_check::Entity::find()
            .filter(health_check::Column::ApiId.eq(api_id))
            .filter(health_check::Column::CheckedAt.gte(since))
    }

    fn alerts_matching(user_id: i32, filter: AlertFilter) -> Select<alert::Entity> {
        let mut query = alert::Entity::find().filter(alert::Column::UserId.eq(user_id));
        if let Some(resolved) = filter.resolved {
            query = query.filter(alert::Column::IsResolved.eq(resolved));
        }
        if let Some(severity) = filter.severity {
            query = query.filter(alert::Column::Severity.eq(severity));
        }
        query
    }
}

#[async_trait]
impl TrackedApiStore for SeaOrmStore {
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<TrackedApi>, StoreError> {
        let apis = tracked_api::Entity::find()
            .filter(tracked_api::Column::IsActive.eq(true))
            .filter(tracked_api::Column::NextCheckAt.lte(now))
            .order_by_asc(tracked_api::Column::NextCheckAt)
            .all(&*self.db)
            .await?;
        Ok(apis)
    }

    async fn get_api(&self, api_id: i32) -> Result<Option<TrackedApi>, StoreError> {
        Ok(tracked_api::Entity::find_by_id(api_id).one(&*self.db).await?)
    }

    async fn save_api(&self, api: &TrackedApi) -> Result<(), StoreError> {
        Self::update_api(&*self.db, api).await
    }

    async fn list_apis_by_user(&self, user_id: i32) -> Result<Vec<TrackedApi>, StoreError> {
        let apis = tracked_api::Entity::find()
            .filter(tracked_api::Column::UserId.eq(user_id))
            .order_by_asc(tracked_api::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(apis)
    }

    async fn create_api(&self, new_api: NewTrackedApi) -> Result<TrackedApi, StoreError> {
        let now = Utc::now();
        let model = tracked_api::ActiveModel {
            user_id: Set(new_api.user_id),
            api_name: Set(new_api.api_name),
            base_url: Set(new_api.base_url),
            documentation_url: Set(new_api.documentation_url),
            health_check_url: Set(new_api.health_check_url),
            http_method: Set(new_api.http_method.unwrap_or(HttpMethod::Get)),
            expected_status: Set(new_api.expected_status.unwrap_or(DEFAULT_EXPECTED_STATUS)),
            check_interval: Set(new_api.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL_SECS)),
            current_status: Set(ApiStatus::Unknown),
            last_checked: Set(None),
            next_check_at: Set(Some(now + Duration::seconds(INITIAL_CHECK_DELAY_SECS))),
            is_active: Set(new_api.is_active.unwrap_or(true)),
            consecutive_failures: Set(0),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(model)
    }

    async fn delete_api(&self, api_id: i32) -> Result<bool, StoreError> {
        let txn = self.db.begin().await?;

        alert::Entity::delete_many()
            .filter(alert::Column::ApiId.eq(api_id))
            .exec(&txn)
            .await?;
        health_check::Entity::delete_many()
            .filter(health_check::Column::ApiId.eq(api_id))
            .exec(&txn)
            .await?;
        let result = tracked_api::Entity::delete_by_id(api_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl HealthCheckStore for SeaOrmStore {
    async fn append_check(&self, check: NewHealthCheck) -> Result<HealthCheck, StoreError> {
        Ok(Self::insert_check(&*self.db, check).await?)
    }

    async fn list_checks_by_api(
        &self,
        api_id: i32,
        params: PageParams,
    ) -> Result<Page<HealthCheck>, StoreError> {
        let params = params.normalized();
        let paginator = health_check::Entity::find()
            .filter(health_check::Column::ApiId.eq(api_id))
            .order_by_desc(health_check::Column::CheckedAt)
            .order_by_desc(health_check::Column::Id)
            .paginate(&*self.db, params.size);

        let total_elements = paginator.num_items().await?;
        let content = paginator.fetch_page(params.page).await?;
        Ok(Page {
            content,
            total_elements,
            page: params.page,
            size: params.size,
        })
    }

    async fn avg_response_time_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError> {
        // AVG over an integer column is NUMERIC on Postgres; cast so it decodes as f64.
        let avg_expr = Func::cast_as(
            Func::avg(Expr::col(health_check::Column::ResponseTimeMs)),
            Alias::new("double precision"),
        );
        let avg = Self::checks_since(api_id, since)
            .filter(health_check::Column::IsUp.eq(true))
            .select_only()
            .column_as(SimpleExpr::from(avg_expr), "avg_response_time")
            .into_tuple::<Option<f64>>()
            .one(&*self.db)
            .await?;
        Ok(avg.flatten())
    }

    async fn count_successful_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(Self::checks_since(api_id, since)
            .filter(health_check::Column::IsUp.eq(true))
            .count(&*self.db)
            .await?)
    }

    async fn count_total_since(
        &self,
        api_id: i32,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(Self::checks_since(api_id, since).count(&*self.db).await?)
    }
}

#[async_trait]
impl AlertStore for SeaOrmStore {
    async fn append_alert(&self, new: NewAlert) -> Result<Alert, StoreError> {
        Ok(Self::insert_alert(&*self.db, new).await?)
    }

    async fn list_alerts_by_user(
        &self,
        user_id: i32,
        filter: AlertFilter,
        params: PageParams,
    ) -> Result<Page<Alert>, StoreError> {
        let params = params.normalized();
        let paginator = Self::alerts_matching(user_id, filter)
            .order_by_desc(alert::Column::CreatedAt)
            .order_by_desc(alert::Column::Id)
            .paginate(&*self.db, params.size);

        let total_elements = paginator.num_items().await?;
        let content = paginator.fetch_page(params.page).await?;
        Ok(Page {
            content,
            total_elements,
            page: params.page,
            size: params.size,
        })
    }

    async fn count_alerts_by_user(
        &self,
        user_id: i32,
        filter: AlertFilter,
    ) -> Result<u64, StoreError> {
        Ok(Self::alerts_matching(user_id, filter)
            .count(&*self.db)
            .await?)
    }

    async fn resolve_alert(&self, alert_id: i32) -> Result<Option<Alert>, StoreError> {
        let Some(existing) = alert::Entity::find_by_id(alert_id).one(&*self.db).await? else {
            return Ok(None);
        };
        if existing.is_resolved {
            return Ok(Some(existing));
        }

        let mut active: alert::ActiveModel = existing.into();
        active.is_resolved = Set(true);
        active.resolved_at = Set(Some(Utc::now()));
        Ok(Some(active.update(&*self.db).await?))
    }
}

#[async_trait]
impl CheckRecorder for SeaOrmStore {
    async fn record_check(
        &self,
        update: &RuntimeUpdate,
        check: NewHealthCheck,
        alert: Option<NewAlert>,
    ) -> Result<(HealthCheck, Option<Alert>), StoreError> {
        let txn = self.db.begin().await?;

        Self::update_runtime(&txn, update).await?;
        let saved_check = Self::insert_check(&txn, check).await?;
        let saved_alert = match alert {
            Some(new) => Some(Self::insert_alert(&txn, new).await?),
            None => None,
        };

        txn.commit().await?;
        Ok((saved_check, saved_alert))
    }
}

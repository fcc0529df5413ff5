//! Postgres-backed food store

use crate::domain::types::{
    ExpiryQuery, FoodId, FoodItem, FoodNotice, FreshnessUpdate, RefreshCategory, RefreshId,
    RefrigeratorId,
};
use crate::io::store::{FoodStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

const FOOD_COLUMNS: &str = "food_id, name, refrigerator_id, refresh_id, prev_refresh_id, \
                            registered_date, expiration_date";

#[derive(Debug, sqlx::FromRow)]
struct FoodRow {
    food_id: i64,
    name: String,
    refrigerator_id: i64,
    refresh_id: i64,
    prev_refresh_id: Option<i64>,
    registered_date: NaiveDate,
    expiration_date: NaiveDate,
}

impl From<FoodRow> for FoodItem {
    fn from(row: FoodRow) -> Self {
        Self {
            id: FoodId(row.food_id),
            name: row.name,
            refrigerator_id: RefrigeratorId(row.refrigerator_id),
            refresh: RefreshId(row.refresh_id),
            prev_refresh: row.prev_refresh_id.map(RefreshId),
            registered_date: row.registered_date,
            expiration_date: row.expiration_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NoticeRow {
    food_id: i64,
    name: String,
    refrigerator_id: i64,
    refresh_name: String,
    expiration_date: NaiveDate,
}

impl From<NoticeRow> for FoodNotice {
    fn from(row: NoticeRow) -> Self {
        Self {
            food_id: FoodId(row.food_id),
            name: row.name,
            refrigerator_id: RefrigeratorId(row.refrigerator_id),
            refresh_name: row.refresh_name,
            expiration_date: row.expiration_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    refresh_id: i64,
    name: String,
}

fn raw_ids(ids: &[FoodId]) -> Vec<i64> {
    ids.iter().map(|id| id.0).collect()
}

#[derive(Clone)]
pub struct PgFoodStore {
    pool: PgPool,
}

impl PgFoodStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        info!(max_connections = %max_connections, "postgres_store_connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("postgres_store_migrated");
        Ok(())
    }
}

#[async_trait]
impl FoodStore for PgFoodStore {
    async fn find_warning_candidates(
        &self,
        query: &ExpiryQuery,
    ) -> Result<Vec<FoodItem>, StoreError> {
        let sql = format!(
            "SELECT {FOOD_COLUMNS} FROM food \
             WHERE refresh_id <> $1 AND refresh_id <> $2 \
               AND expiration_date BETWEEN $3 AND $4 \
             ORDER BY food_id"
        );
        let rows = sqlx::query_as::<_, FoodRow>(&sql)
            .bind(query.warning_category.0)
            .bind(query.danger_category.0)
            .bind(query.today)
            .bind(query.horizon)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(FoodItem::from).collect())
    }

    async fn find_danger_candidates(&self, query: &ExpiryQuery) -> Result<Vec<FoodId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT food_id FROM food \
             WHERE refresh_id <> $1 AND expiration_date < $2 \
             ORDER BY food_id",
        )
        .bind(query.danger_category.0)
        .bind(query.today)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(FoodId).collect())
    }

    async fn find_items_by_ids(&self, ids: &[FoodId]) -> Result<Vec<FoodItem>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {FOOD_COLUMNS} FROM food WHERE food_id = ANY($1) ORDER BY food_id");
        let rows = sqlx::query_as::<_, FoodRow>(&sql)
            .bind(raw_ids(ids))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(FoodItem::from).collect())
    }

    async fn find_notification_items(&self, ids: &[FoodId]) -> Result<Vec<FoodNotice>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, NoticeRow>(
            "SELECT f.food_id, f.name, f.refrigerator_id, r.name AS refresh_name, f.expiration_date \
             FROM food f JOIN refresh r ON r.refresh_id = f.refresh_id \
             WHERE f.food_id = ANY($1) \
             ORDER BY f.refrigerator_id, f.food_id",
        )
        .bind(raw_ids(ids))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FoodNotice::from).collect())
    }

    async fn find_refresh_category(
        &self,
        id: RefreshId,
    ) -> Result<Option<RefreshCategory>, StoreError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT refresh_id, name FROM refresh WHERE refresh_id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| RefreshCategory::new(RefreshId(r.refresh_id), r.name)))
    }

    async fn commit_freshness_updates(
        &self,
        updates: &[FreshnessUpdate],
    ) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }

        // Dropping the transaction on an early return rolls it back.
        // SET expressions read the pre-update row, so prev_refresh_id gets the
        // category the row held inside this transaction.
        let mut tx = self.pool.begin().await?;
        for update in updates {
            sqlx::query(
                "UPDATE food SET prev_refresh_id = refresh_id, refresh_id = $2 WHERE food_id = $1",
            )
            .bind(update.food_id.0)
            .bind(update.target.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(updates = %updates.len(), "postgres_store_committed");
        Ok(())
    }
}

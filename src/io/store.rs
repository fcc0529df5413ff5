//! Food store port - the relational data the expiry job reads and mutates
//!
//! Implementations:
//! - `MemoryFoodStore` - in-process store, optionally seeded from JSON
//! - `PgFoodStore` - Postgres via sqlx

use crate::domain::types::{
    ExpiryQuery, FoodId, FoodItem, FoodNotice, FreshnessUpdate, RefreshCategory, RefreshId,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("update rejected for food {food_id}: {reason}")]
    Rejected { food_id: FoodId, reason: String },

    #[error("invalid seed data: {0}")]
    Seed(String),
}

/// Persistence operations consumed by the expiry pipeline
///
/// Lookups by ID silently omit IDs with no stored row.
#[async_trait]
pub trait FoodStore: Send + Sync {
    /// Items inside the warning look-ahead window that are not yet warning or danger
    async fn find_warning_candidates(
        &self,
        query: &ExpiryQuery,
    ) -> Result<Vec<FoodItem>, StoreError>;

    /// IDs of items past expiry that are not yet danger
    async fn find_danger_candidates(&self, query: &ExpiryQuery) -> Result<Vec<FoodId>, StoreError>;

    /// Full item rows for the given IDs
    async fn find_items_by_ids(&self, ids: &[FoodId]) -> Result<Vec<FoodItem>, StoreError>;

    /// Notification projection for the given IDs
    async fn find_notification_items(&self, ids: &[FoodId]) -> Result<Vec<FoodNotice>, StoreError>;

    async fn find_refresh_category(
        &self,
        id: RefreshId,
    ) -> Result<Option<RefreshCategory>, StoreError>;

    /// Apply every update or none of them
    async fn commit_freshness_updates(&self, updates: &[FreshnessUpdate])
        -> Result<(), StoreError>;
}

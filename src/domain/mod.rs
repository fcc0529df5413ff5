//! Domain models - food items, freshness categories and classification
//!
//! This module contains the canonical data types used throughout the system:
//! - `FoodItem` - a stored food item with its current and previous freshness
//! - `RefreshCategory` - freshness lookup rows (normal, warning, danger)
//! - `FreshnessScorer` - scores how close an item is to expiry
//! - `Classification` - item IDs selected by one run, passed between stages

pub mod classification;
pub mod freshness;
pub mod types;

// Re-export commonly used types at module level
pub use classification::Classification;
pub use freshness::{ExpiryPolicy, FreshnessScorer, ShelfLifeScorer};
pub use types::{
    ExpiryQuery, FoodId, FoodItem, FoodNotice, FreshnessUpdate, NotificationReason,
    RefreshCategory, RefreshId, RefrigeratorId,
};

//! Shared types for the expiry service

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Newtype wrapper for food item IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct FoodId(pub i64);

impl std::fmt::Display for FoodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for freshness category IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct RefreshId(pub i64);

impl RefreshId {
    pub const NORMAL: RefreshId = RefreshId(1);
    pub const WARNING: RefreshId = RefreshId(2);
    pub const DANGER: RefreshId = RefreshId(3);
}

impl std::fmt::Display for RefreshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for refrigerator IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct RefrigeratorId(pub i64);

impl std::fmt::Display for RefrigeratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Freshness category row (lookup table in the store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshCategory {
    pub id: RefreshId,
    pub name: String,
}

impl RefreshCategory {
    pub fn new(id: RefreshId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// The three fixed levels every deployment is seeded with
    pub fn defaults() -> Vec<RefreshCategory> {
        vec![
            RefreshCategory::new(RefreshId::NORMAL, "normal"),
            RefreshCategory::new(RefreshId::WARNING, "warning"),
            RefreshCategory::new(RefreshId::DANGER, "danger"),
        ]
    }
}

/// A stored food item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: FoodId,
    pub name: String,
    pub refrigerator_id: RefrigeratorId,
    /// Current freshness category
    pub refresh: RefreshId,
    /// Category held before the most recent reclassification
    #[serde(default)]
    pub prev_refresh: Option<RefreshId>,
    pub registered_date: NaiveDate,
    pub expiration_date: NaiveDate,
}

impl FoodItem {
    /// Signed number of days from `today` until expiry (negative once expired)
    pub fn days_until_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiration_date - today).num_days()
    }
}

/// Projection of a food item used to render notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodNotice {
    pub food_id: FoodId,
    pub name: String,
    pub refrigerator_id: RefrigeratorId,
    /// Name of the item's current freshness category
    pub refresh_name: String,
    pub expiration_date: NaiveDate,
}

/// A single freshness transition to be committed by the store
///
/// The store copies the row's current category into `prev_refresh` at commit
/// time, so the recorded history is the value the row held when it was moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessUpdate {
    pub food_id: FoodId,
    pub target: RefreshId,
}

impl FreshnessUpdate {
    pub fn new(food_id: FoodId, target: RefreshId) -> Self {
        Self { food_id, target }
    }

    /// Move `item` to `target`
    pub fn transition(item: &FoodItem, target: RefreshId) -> Self {
        Self::new(item.id, target)
    }
}

/// Parameters the store needs to select candidates for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryQuery {
    /// Reference date of the run
    pub today: NaiveDate,
    /// Last expiration date still inside the warning look-ahead window
    pub horizon: NaiveDate,
    pub warning_category: RefreshId,
    pub danger_category: RefreshId,
}

impl ExpiryQuery {
    /// Whether `item` belongs to the warning look-ahead window
    pub fn is_warning_candidate(&self, item: &FoodItem) -> bool {
        item.refresh != self.warning_category
            && item.refresh != self.danger_category
            && item.expiration_date >= self.today
            && item.expiration_date <= self.horizon
    }

    /// Whether `item` is past expiry and not yet marked danger
    pub fn is_danger_candidate(&self, item: &FoodItem) -> bool {
        item.refresh != self.danger_category && item.expiration_date < self.today
    }
}

/// Reason tag attached to outbound notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationReason {
    Expire,
}

impl NotificationReason {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationReason::Expire => "expire",
        }
    }
}

impl std::fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

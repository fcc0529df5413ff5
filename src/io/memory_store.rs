//! In-process food store
//!
//! Backs development runs (seeded from a JSON file) and tests. Writes are
//! staged on a copy of the item table and swapped in only when every update
//! succeeded, so a failed commit leaves no partial state behind.

use crate::domain::types::{
    ExpiryQuery, FoodId, FoodItem, FoodNotice, FreshnessUpdate, RefreshCategory, RefreshId,
    RefrigeratorId,
};
use crate::io::store::{FoodStore, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Seed file layout
#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    categories: Vec<RefreshCategory>,
    #[serde(default)]
    foods: Vec<SeedFood>,
}

#[derive(Debug, Deserialize)]
struct SeedFood {
    id: FoodId,
    name: String,
    refrigerator_id: RefrigeratorId,
    #[serde(default)]
    refresh: Option<RefreshId>,
    #[serde(default)]
    prev_refresh: Option<RefreshId>,
    registered_date: NaiveDate,
    expiration_date: NaiveDate,
}

#[derive(Default)]
pub struct MemoryFoodStore {
    foods: RwLock<FxHashMap<FoodId, FoodItem>>,
    categories: RwLock<FxHashMap<RefreshId, RefreshCategory>>,
    /// Items whose next update is refused (failure injection)
    rejected: Mutex<FxHashSet<FoodId>>,
}

impl MemoryFoodStore {
    /// Empty store without any categories
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store with the normal/warning/danger categories
    pub fn with_default_categories() -> Self {
        let store = Self::new();
        for category in RefreshCategory::defaults() {
            store.insert_category(category);
        }
        store
    }

    /// Parse a JSON seed document
    ///
    /// Foods without an explicit `refresh` start in `default_refresh`.
    /// Missing `categories` fall back to the three default levels.
    pub fn from_seed_json(json: &str, default_refresh: RefreshId) -> Result<Self, StoreError> {
        let seed: SeedFile =
            serde_json::from_str(json).map_err(|e| StoreError::Seed(e.to_string()))?;

        let store = if seed.categories.is_empty() {
            Self::with_default_categories()
        } else {
            let store = Self::new();
            for category in seed.categories {
                store.insert_category(category);
            }
            store
        };

        for food in seed.foods {
            if store.item(food.id).is_some() {
                return Err(StoreError::Seed(format!("duplicate food id {}", food.id)));
            }
            store.insert_item(FoodItem {
                id: food.id,
                name: food.name,
                refrigerator_id: food.refrigerator_id,
                refresh: food.refresh.unwrap_or(default_refresh),
                prev_refresh: food.prev_refresh,
                registered_date: food.registered_date,
                expiration_date: food.expiration_date,
            });
        }

        Ok(store)
    }

    /// Load a JSON seed file from disk
    pub fn from_seed_file<P: AsRef<Path>>(
        path: P,
        default_refresh: RefreshId,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Seed(format!("{}: {}", path.display(), e)))?;
        let store = Self::from_seed_json(&content, default_refresh)?;
        info!(
            seed_file = %path.display(),
            foods = %store.len(),
            "memory_store_seeded"
        );
        Ok(store)
    }

    pub fn insert_item(&self, item: FoodItem) {
        self.foods.write().insert(item.id, item);
    }

    pub fn remove_item(&self, id: FoodId) -> Option<FoodItem> {
        self.foods.write().remove(&id)
    }

    pub fn item(&self, id: FoodId) -> Option<FoodItem> {
        self.foods.read().get(&id).cloned()
    }

    pub fn insert_category(&self, category: RefreshCategory) {
        self.categories.write().insert(category.id, category);
    }

    pub fn remove_category(&self, id: RefreshId) -> Option<RefreshCategory> {
        self.categories.write().remove(&id)
    }

    /// Make any commit that touches `id` fail
    pub fn reject_updates_for(&self, id: FoodId) {
        self.rejected.lock().insert(id);
    }

    pub fn clear_rejections(&self) {
        self.rejected.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.foods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.read().is_empty()
    }

    fn collect_sorted<T, F>(&self, mut select: F) -> Vec<T>
    where
        F: FnMut(&FoodItem) -> Option<T>,
        T: Ord,
    {
        let foods = self.foods.read();
        let mut out: Vec<T> = foods.values().filter_map(&mut select).collect();
        out.sort_unstable();
        out
    }
}

#[async_trait]
impl FoodStore for MemoryFoodStore {
    async fn find_warning_candidates(
        &self,
        query: &ExpiryQuery,
    ) -> Result<Vec<FoodItem>, StoreError> {
        let foods = self.foods.read();
        let mut items: Vec<FoodItem> =
            foods.values().filter(|item| query.is_warning_candidate(item)).cloned().collect();
        items.sort_unstable_by_key(|item| item.id);
        Ok(items)
    }

    async fn find_danger_candidates(&self, query: &ExpiryQuery) -> Result<Vec<FoodId>, StoreError> {
        Ok(self.collect_sorted(|item| query.is_danger_candidate(item).then_some(item.id)))
    }

    async fn find_items_by_ids(&self, ids: &[FoodId]) -> Result<Vec<FoodItem>, StoreError> {
        let foods = self.foods.read();
        Ok(ids.iter().filter_map(|id| foods.get(id).cloned()).collect())
    }

    async fn find_notification_items(&self, ids: &[FoodId]) -> Result<Vec<FoodNotice>, StoreError> {
        let foods = self.foods.read();
        let categories = self.categories.read();
        Ok(ids
            .iter()
            .filter_map(|id| foods.get(id))
            .map(|item| FoodNotice {
                food_id: item.id,
                name: item.name.clone(),
                refrigerator_id: item.refrigerator_id,
                refresh_name: categories
                    .get(&item.refresh)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| format!("refresh_{}", item.refresh)),
                expiration_date: item.expiration_date,
            })
            .collect())
    }

    async fn find_refresh_category(
        &self,
        id: RefreshId,
    ) -> Result<Option<RefreshCategory>, StoreError> {
        Ok(self.categories.read().get(&id).cloned())
    }

    async fn commit_freshness_updates(
        &self,
        updates: &[FreshnessUpdate],
    ) -> Result<(), StoreError> {
        let rejected = self.rejected.lock().clone();
        let mut foods = self.foods.write();
        let mut staged = foods.clone();

        for update in updates {
            if rejected.contains(&update.food_id) {
                debug!(food_id = %update.food_id, "memory_store_commit_rolled_back");
                return Err(StoreError::Rejected {
                    food_id: update.food_id,
                    reason: "update rejected by store".to_string(),
                });
            }
            if let Some(item) = staged.get_mut(&update.food_id) {
                item.prev_refresh = Some(item.refresh);
                item.refresh = update.target;
            }
        }

        *foods = staged;
        debug!(updates = %updates.len(), "memory_store_committed");
        Ok(())
    }
}

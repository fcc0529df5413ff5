//! Typed result of the classify stage, handed to the later stages of a run

use crate::domain::types::FoodId;
use serde::Serialize;

/// Item IDs selected by one classify pass
///
/// Both lists are sorted and free of duplicates. An ID present in both
/// inputs is kept only in `danger_ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    warn_ids: Vec<FoodId>,
    danger_ids: Vec<FoodId>,
}

impl Classification {
    pub fn new(mut warn_ids: Vec<FoodId>, mut danger_ids: Vec<FoodId>) -> Self {
        danger_ids.sort_unstable();
        danger_ids.dedup();

        warn_ids.sort_unstable();
        warn_ids.dedup();
        warn_ids.retain(|id| danger_ids.binary_search(id).is_err());

        Self { warn_ids, danger_ids }
    }

    pub fn warn_ids(&self) -> &[FoodId] {
        &self.warn_ids
    }

    pub fn danger_ids(&self) -> &[FoodId] {
        &self.danger_ids
    }

    pub fn is_empty(&self) -> bool {
        self.warn_ids.is_empty() && self.danger_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warn_ids.len() + self.danger_ids.len()
    }
}

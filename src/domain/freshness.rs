//! Freshness scoring and the expiry policy derived from configuration

use crate::domain::types::{ExpiryQuery, FoodItem, RefreshId};
use crate::infra::config::Config;
use chrono::{Days, NaiveDate};

/// Score returned for items that still have plenty of shelf life
pub const SCORE_FRESH: i32 = 1;
/// Score returned for items about to expire
pub const SCORE_ABOUT_TO_EXPIRE: i32 = 2;
/// Score returned for items past their expiration date
pub const SCORE_EXPIRED: i32 = 3;

/// Computes a freshness score for a single item
pub trait FreshnessScorer: Send + Sync {
    fn score(&self, item: &FoodItem, today: NaiveDate) -> i32;
}

/// Scores items by the number of days left before expiry
///
/// - expired → [`SCORE_EXPIRED`]
/// - at most `warning_window_days` left → [`SCORE_ABOUT_TO_EXPIRE`]
/// - otherwise → [`SCORE_FRESH`]
#[derive(Debug, Clone, Copy)]
pub struct ShelfLifeScorer {
    warning_window_days: u32,
}

impl ShelfLifeScorer {
    pub fn new(warning_window_days: u32) -> Self {
        Self { warning_window_days }
    }
}

impl FreshnessScorer for ShelfLifeScorer {
    fn score(&self, item: &FoodItem, today: NaiveDate) -> i32 {
        let days_left = item.days_until_expiry(today);
        if days_left < 0 {
            SCORE_EXPIRED
        } else if days_left <= i64::from(self.warning_window_days) {
            SCORE_ABOUT_TO_EXPIRE
        } else {
            SCORE_FRESH
        }
    }
}

/// Thresholds and category IDs used by one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub warning_window_days: u32,
    /// Score a warning candidate must have to be reclassified
    pub warning_score: i32,
    pub warning_category: RefreshId,
    pub danger_category: RefreshId,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            warning_window_days: 3,
            warning_score: SCORE_ABOUT_TO_EXPIRE,
            warning_category: RefreshId::WARNING,
            danger_category: RefreshId::DANGER,
        }
    }
}

impl ExpiryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            warning_window_days: config.warning_window_days(),
            warning_score: config.warning_score(),
            warning_category: config.warning_category(),
            danger_category: config.danger_category(),
        }
    }

    /// Build the store query for a run on `today`
    pub fn query_for(&self, today: NaiveDate) -> ExpiryQuery {
        let horizon = today
            .checked_add_days(Days::new(u64::from(self.warning_window_days)))
            .unwrap_or(NaiveDate::MAX);
        ExpiryQuery {
            today,
            horizon,
            warning_category: self.warning_category,
            danger_category: self.danger_category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{FoodId, RefrigeratorId};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn expiring_on(expires: NaiveDate) -> FoodItem {
        FoodItem {
            id: FoodId(7),
            name: "tofu".to_string(),
            refrigerator_id: RefrigeratorId(1),
            refresh: RefreshId::NORMAL,
            prev_refresh: None,
            registered_date: date(2024, 5, 1),
            expiration_date: expires,
        }
    }

    #[test]
    fn test_shelf_life_scores() {
        let scorer = ShelfLifeScorer::new(3);
        let today = date(2024, 5, 10);

        assert_eq!(scorer.score(&expiring_on(date(2024, 5, 9)), today), SCORE_EXPIRED);
        assert_eq!(scorer.score(&expiring_on(date(2024, 5, 10)), today), SCORE_ABOUT_TO_EXPIRE);
        assert_eq!(scorer.score(&expiring_on(date(2024, 5, 13)), today), SCORE_ABOUT_TO_EXPIRE);
        assert_eq!(scorer.score(&expiring_on(date(2024, 5, 14)), today), SCORE_FRESH);
    }

    #[test]
    fn test_zero_day_window_only_warns_on_expiry_day() {
        let scorer = ShelfLifeScorer::new(0);
        let today = date(2024, 5, 10);

        assert_eq!(scorer.score(&expiring_on(today), today), SCORE_ABOUT_TO_EXPIRE);
        assert_eq!(scorer.score(&expiring_on(date(2024, 5, 11)), today), SCORE_FRESH);
    }

    #[test]
    fn test_query_horizon() {
        let policy = ExpiryPolicy::default();
        let query = policy.query_for(date(2024, 12, 30));

        assert_eq!(query.today, date(2024, 12, 30));
        assert_eq!(query.horizon, date(2025, 1, 2));
        assert_eq!(query.warning_category, RefreshId::WARNING);
        assert_eq!(query.danger_category, RefreshId::DANGER);
    }

    #[test]
    fn test_policy_from_default_config() {
        let policy = ExpiryPolicy::from_config(&Config::default());
        assert_eq!(policy, ExpiryPolicy::default());
    }
}

//! Expiry pipeline - classify, reclassify, notify
//!
//! One run executes three stages strictly in order:
//! 1. classify - select items about to expire (warning) and past expiry (danger)
//! 2. reclassify - move them to the warning/danger category, remembering the previous one
//! 3. notify - send one notification per non-empty set
//!
//! The [`Classification`] built by stage 1 is handed to both later stages, so
//! stage 3 notifies about the items stage 1 selected even if stage 2 found
//! some of them gone.


use crate::domain::classification::Classification;
use crate::domain::freshness::{ExpiryPolicy, FreshnessScorer};
use crate::domain::types::{FoodId, FreshnessUpdate, NotificationReason, RefreshCategory, RefreshId};
use crate::infra::metrics::duration_ms;
use crate::io::notifier::Notifier;
use crate::io::store::{FoodStore, StoreError};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("freshness category {0} not found")]
    MissingCategory(RefreshId),
}

/// Outcome of the reclassify stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyReport {
    /// Items moved to the warning category
    pub warned: usize,
    /// Items moved to the danger category
    pub dangered: usize,
    /// Classified IDs with no stored item
    pub missing: usize,
}

/// Summary of one complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub today: NaiveDate,
    /// Warning candidates returned by the store before scoring
    pub warn_candidates: usize,
    pub classification: Classification,
    pub reclassified: ReclassifyReport,
    /// Notification calls issued
    pub notifications: usize,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,
}

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration_ms(*d))
}

/// Generate a new UUIDv7 (time-sortable) run identifier
pub fn new_run_id() -> String {
    Uuid::now_v7().to_string()
}

pub struct ExpiryPipeline {
    store: Arc<dyn FoodStore>,
    notifier: Arc<dyn Notifier>,
    scorer: Arc<dyn FreshnessScorer>,
    policy: ExpiryPolicy,
}

impl ExpiryPipeline {
    pub fn new(
        store: Arc<dyn FoodStore>,
        notifier: Arc<dyn Notifier>,
        scorer: Arc<dyn FreshnessScorer>,
        policy: ExpiryPolicy,
    ) -> Self {
        Self { store, notifier, scorer, policy }
    }

    /// Execute all three stages for the given reference date
    pub async fn run_at(&self, today: NaiveDate) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        let run_id = new_run_id();
        info!(run_id = %run_id, today = %today, "expiry_run_started");

        let (classification, warn_candidates) = self.classify_with_stats(today).await?;
        let reclassified = self.reclassify(&classification).await?;
        let notifications = self.notify(&classification).await?;

        let report = RunReport {
            run_id,
            today,
            warn_candidates,
            classification,
            reclassified,
            notifications,
            elapsed: start.elapsed(),
        };
        info!(
            run_id = %report.run_id,
            warned = %report.reclassified.warned,
            dangered = %report.reclassified.dangered,
            missing = %report.reclassified.missing,
            notifications = %report.notifications,
            elapsed_ms = %duration_ms(report.elapsed),
            "expiry_run_completed"
        );
        Ok(report)
    }

    /// Stage 1: select warning and danger item IDs
    pub async fn classify(&self, today: NaiveDate) -> Result<Classification, PipelineError> {
        self.classify_with_stats(today).await.map(|(classification, _)| classification)
    }

    async fn classify_with_stats(
        &self,
        today: NaiveDate,
    ) -> Result<(Classification, usize), PipelineError> {
        let query = self.policy.query_for(today);

        let warning_candidates = self.store.find_warning_candidates(&query).await?;
        let danger_ids = self.store.find_danger_candidates(&query).await?;

        let warn_ids: Vec<FoodId> = warning_candidates
            .iter()
            .filter(|item| self.scorer.score(item, today) == self.policy.warning_score)
            .map(|item| item.id)
            .collect();

        let classification = Classification::new(warn_ids, danger_ids);
        info!(
            candidates = %warning_candidates.len(),
            warn = %classification.warn_ids().len(),
            danger = %classification.danger_ids().len(),
            warn_ids = ?classification.warn_ids(),
            danger_ids = ?classification.danger_ids(),
            "expiry_classified"
        );
        Ok((classification, warning_candidates.len()))
    }

    /// Stage 2: move classified items to their new category in one commit
    pub async fn reclassify(
        &self,
        classification: &Classification,
    ) -> Result<ReclassifyReport, PipelineError> {
        let warning = self.category(self.policy.warning_category).await?;
        let danger = self.category(self.policy.danger_category).await?;

        let warn_items = self.store.find_items_by_ids(classification.warn_ids()).await?;
        let danger_items = self.store.find_items_by_ids(classification.danger_ids()).await?;

        let mut updates = Vec::with_capacity(warn_items.len() + danger_items.len());
        updates.extend(warn_items.iter().map(|item| FreshnessUpdate::transition(item, warning.id)));
        updates.extend(danger_items.iter().map(|item| FreshnessUpdate::transition(item, danger.id)));

        self.store.commit_freshness_updates(&updates).await?;

        let report = ReclassifyReport {
            warned: warn_items.len(),
            dangered: danger_items.len(),
            missing: classification.len().saturating_sub(updates.len()),
        };
        if report.missing > 0 {
            debug!(missing = %report.missing, "expiry_reclassify_skipped_missing");
        }
        info!(
            warned = %report.warned,
            dangered = %report.dangered,
            warning_category = %warning.name,
            danger_category = %danger.name,
            "expiry_reclassified"
        );
        Ok(report)
    }

    /// Stage 3: one notification per non-empty set; returns the number sent
    pub async fn notify(&self, classification: &Classification) -> Result<usize, PipelineError> {
        let mut sent = 0;
        for (level, ids) in
            [("warning", classification.warn_ids()), ("danger", classification.danger_ids())]
        {
            if ids.is_empty() {
                continue;
            }
            let notices = self.store.find_notification_items(ids).await?;
            if notices.is_empty() {
                debug!(level = %level, requested = %ids.len(), "expiry_notify_nothing_found");
                continue;
            }
            self.notifier.send_notification(&notices, NotificationReason::Expire).await;
            sent += 1;
            debug!(level = %level, count = %notices.len(), "expiry_notification_dispatched");
        }
        Ok(sent)
    }

    async fn category(&self, id: RefreshId) -> Result<RefreshCategory, PipelineError> {
        self.store.find_refresh_category(id).await?.ok_or(PipelineError::MissingCategory(id))
    }
}

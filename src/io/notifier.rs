//! Notification port
//!
//! Senders own their delivery failures: they log and drop, and never report
//! an error back to the pipeline.

use crate::domain::types::{FoodNotice, NotificationReason};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification covering `items`
    async fn send_notification(&self, items: &[FoodNotice], reason: NotificationReason);
}

/// Wire payload shared by the HTTP and MQTT senders
#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    /// Reason tag (e.g., "expire")
    pub reason: NotificationReason,
    /// Creation time (RFC 3339)
    pub sent_at: DateTime<Utc>,
    pub count: usize,
    pub foods: &'a [FoodNotice],
}

impl<'a> NotificationPayload<'a> {
    pub fn new(items: &'a [FoodNotice], reason: NotificationReason) -> Self {
        Self { reason, sent_at: Utc::now(), count: items.len(), foods: items }
    }
}

/// Writes notifications to the log only (development default)
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, items: &[FoodNotice], reason: NotificationReason) {
        for item in items {
            info!(
                reason = %reason,
                food_id = %item.food_id,
                name = %item.name,
                refrigerator_id = %item.refrigerator_id,
                refresh = %item.refresh_name,
                expiration_date = %item.expiration_date,
                "notification_item"
            );
        }
        info!(reason = %reason, count = %items.len(), "notification_logged");
    }
}

//! MQTT notifications
//!
//! Publishes one JSON [`NotificationPayload`] per notification to
//! `<topic>/<reason>` with QoS 1 (at-least-once delivery).

use crate::domain::types::{FoodNotice, NotificationReason};
use crate::infra::config::Config;
use crate::io::notifier::{NotificationPayload, Notifier};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct MqttNotifier {
    client: AsyncClient,
    topic: String,
}

impl MqttNotifier {
    /// Connect to the configured broker
    ///
    /// Must be called inside a Tokio runtime; the event loop is spawned here.
    pub fn new(config: &Config) -> Self {
        let client_id = format!("fridge-expiry-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_notifier_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_notifier_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_notifier_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, topic: config.mqtt_topic().to_string() }
    }

    fn topic_for(&self, reason: NotificationReason) -> String {
        format!("{}/{}", self.topic.trim_end_matches('/'), reason.as_str())
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn send_notification(&self, items: &[FoodNotice], reason: NotificationReason) {
        let payload = NotificationPayload::new(items, reason);
        let json = match serde_json::to_vec(&payload) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, reason = %reason, "mqtt_notification_encode_failed");
                return;
            }
        };

        let topic = self.topic_for(reason);
        match self.client.publish(&topic, QoS::AtLeastOnce, false, json).await {
            Ok(()) => {
                info!(topic = %topic, count = %items.len(), "notification_published");
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "mqtt_notification_failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_topic_for_reason() {
        let notifier = MqttNotifier::new(&Config::default());
        assert_eq!(notifier.topic_for(NotificationReason::Expire), "fridge/notifications/expire");
    }
}

//! Push-relay notifications over HTTP
//!
//! POSTs a JSON [`NotificationPayload`] to the configured relay URL. Basic
//! auth credentials embedded in the URL are lifted into an Authorization
//! header.

use crate::domain::types::{FoodNotice, NotificationReason};
use crate::infra::metrics::duration_ms;
use crate::io::notifier::{NotificationPayload, Notifier};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub struct HttpNotifier {
    url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let (url, username, password) = Self::parse_url_with_auth(url);
        // Created once for reuse (connection pooling)
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, username, password, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Parse URL and extract basic auth credentials if present
    fn parse_url_with_auth(url: &str) -> (String, Option<String>, Option<String>) {
        for scheme in ["http://", "https://"] {
            let Some(rest) = url.strip_prefix(scheme) else {
                continue;
            };
            // credentials end at the first '@' before any path separator
            let authority_end = rest.find('/').unwrap_or(rest.len());
            if let Some(at_pos) = rest[..authority_end].rfind('@') {
                let auth_part = &rest[..at_pos];
                let host_part = &rest[at_pos + 1..];

                if let Some(colon_pos) = auth_part.find(':') {
                    let username = auth_part[..colon_pos].to_string();
                    let password = auth_part[colon_pos + 1..].to_string();
                    let clean_url = format!("{}{}", scheme, host_part);
                    return (clean_url, Some(username), Some(password));
                }
            }
        }
        (url.to_string(), None, None)
    }

    fn authorization_header(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                let credentials = format!("{}:{}", username, password);
                Some(format!("Basic {}", STANDARD.encode(credentials.as_bytes())))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_notification(&self, items: &[FoodNotice], reason: NotificationReason) {
        let start = Instant::now();
        let payload = NotificationPayload::new(items, reason);

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(auth_header) = self.authorization_header() {
            request = request.header("Authorization", auth_header);
        }

        match request.send().await {
            Ok(response) => {
                let latency_ms = duration_ms(start.elapsed());
                let status = response.status();
                if status.is_success() {
                    info!(
                        reason = %reason,
                        count = %items.len(),
                        status = %status.as_u16(),
                        latency_ms = %latency_ms,
                        "notification_sent"
                    );
                } else {
                    warn!(
                        reason = %reason,
                        count = %items.len(),
                        status = %status.as_u16(),
                        latency_ms = %latency_ms,
                        "notification_rejected"
                    );
                }
            }
            Err(e) => {
                error!(
                    reason = %reason,
                    count = %items.len(),
                    latency_ms = %duration_ms(start.elapsed()),
                    error = %e,
                    "notification_send_error"
                );
            }
        }
    }
}

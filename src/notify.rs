//! Webhook status notifications
//!
//! Relays human-readable status lines to a Discord-style webhook. Delivery
//! is best-effort: a missing URL or a failed POST is logged and swallowed,
//! never propagated into the decision path.

use crate::logging::get_logger;
use serde_json::json;

/// Timeout for webhook delivery
const NOTIFY_TIMEOUT_SECS: u64 = 30;

/// Display name attached to webhook messages
const WEBHOOK_USERNAME: &str = "Chargeguard Bot";

/// Best-effort webhook notifier
pub struct Notifier {
    webhook_url: Option<String>,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            webhook_url,
            http,
            logger: get_logger("notify"),
        }
    }

    /// Send a status line to the webhook, if one is configured.
    ///
    /// Failures are logged only; callers never see them.
    pub async fn send(&self, message: &str) {
        let Some(url) = &self.webhook_url else {
            self.logger
                .warn("Webhook URL not configured, skipping notification");
            return;
        };

        let body = json!({
            "content": message,
            "username": WEBHOOK_USERNAME,
            "avatar_url": "https://example.com/avatar.png",
        });

        match self.http.post(url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.logger.info("Webhook notification sent successfully");
            }
            Ok(resp) => {
                self.logger.error(&format!(
                    "Failed to send webhook notification: {}",
                    resp.status()
                ));
            }
            Err(e) => {
                self.logger
                    .error(&format!("Failed to send webhook notification: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_url_is_a_noop() {
        let notifier = Notifier::new(None);
        // Must not panic or attempt any network call
        notifier.send("hello").await;
    }
}

//! Notification channels for emergency alerts.
//!
//! Actual SMS/voice delivery lives behind whatever the webhook points at;
//! this crate only hands each guardian's alert to a channel and records the
//! per-guardian outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::NotifyError;
use crate::profile::Guardian;

/// Payload describing one emergency incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub incident_id: String,
    pub user_name: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, guardian: &Guardian, alert: &EmergencyAlert) -> Result<(), NotifyError>;
}

/// Channel that only writes the alert to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, guardian: &Guardian, alert: &EmergencyAlert) -> Result<(), NotifyError> {
        info!(
            incident_id = %alert.incident_id,
            guardian = %guardian.name,
            phone = guardian.phone.as_deref().unwrap_or("-"),
            email = guardian.email.as_deref().unwrap_or("-"),
            "emergency alert: {}",
            alert.message
        );
        Ok(())
    }
}

/// Posts one JSON document per guardian to an HTTP relay.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: &str) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, guardian: &Guardian, alert: &EmergencyAlert) -> Result<(), NotifyError> {
        if self.webhook_url.is_empty() {
            return Err(NotifyError::NotConfigured("emergency.webhook_url is empty".into()));
        }

        let body = json!({
            "incident_id": alert.incident_id,
            "user": alert.user_name,
            "message": alert.message,
            "raised_at": alert.raised_at,
            "guardian": {
                "name": guardian.name,
                "phone": guardian.phone,
                "email": guardian.email,
            },
        });

        let resp = self.client.post(&self.webhook_url).json(&body).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(NotifyError::Delivery(format!("webhook error (HTTP {status}): {text}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> EmergencyAlert {
        EmergencyAlert {
            incident_id: "inc-1".into(),
            user_name: "Sam".into(),
            message: "Sam needs help".into(),
            raised_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn webhook_posts_guardian_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/alerts")
            .match_body(mockito::Matcher::PartialJson(json!({
                "incident_id": "inc-1",
                "guardian": { "name": "Mom", "phone": "+15550100" },
            })))
            .with_status(204)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(&format!("{}/alerts", server.url()));
        let guardian = Guardian::new("Mom", Some("+15550100"), None);
        notifier.notify(&guardian, &alert()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_surfaces_http_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("relay down")
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(&server.url());
        let guardian = Guardian::new("Dad", None, Some("dad@example.com"));
        let err = notifier.notify(&guardian, &alert()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Delivery(msg) if msg.contains("relay down")));
    }

    #[tokio::test]
    async fn webhook_without_url_is_not_configured() {
        let notifier = WebhookNotifier::new("");
        let guardian = Guardian::new("Dad", None, Some("dad@example.com"));
        assert!(matches!(
            notifier.notify(&guardian, &alert()).await,
            Err(NotifyError::NotConfigured(_))
        ));
    }
}

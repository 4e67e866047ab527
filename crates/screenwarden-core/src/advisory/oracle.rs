//! Advisory oracle transports.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::AdvisoryError;
use crate::credentials;
use crate::storage::config::AdvisoryConfig;

/// External scoring service. Takes a text prompt, returns raw text that is
/// expected to contain `{score, recommendation}` JSON.
#[async_trait]
pub trait AdvisoryOracle: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String, AdvisoryError>;
}

/// Oracle used when advisory refresh is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledOracle;

#[async_trait]
impl AdvisoryOracle for DisabledOracle {
    async fn ask(&self, _prompt: &str) -> Result<String, AdvisoryError> {
        Err(AdvisoryError::Disabled)
    }
}

/// Chat-completions style HTTP oracle.
///
/// Posts the prompt as a single user message and reads
/// `choices[0].message.content` from the reply.
pub struct HttpOracle {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpOracle {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    /// Build from config, loading the API key from the OS keyring
    /// (absent key means requests go out unauthenticated).
    pub fn from_config(config: &AdvisoryConfig) -> Self {
        let api_key = credentials::load_api_key().unwrap_or_else(|e| {
            warn!(error = %e, "could not read advisory API key, sending unauthenticated");
            None
        });
        Self::new(&config.endpoint, &config.model, api_key)
    }
}

#[async_trait]
impl AdvisoryOracle for HttpOracle {
    async fn ask(&self, prompt: &str) -> Result<String, AdvisoryError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": "You answer only with JSON." },
                { "role": "user", "content": prompt },
            ],
            "response_format": { "type": "json_object" },
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AdvisoryError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| AdvisoryError::Malformed(e.to_string()))?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AdvisoryError::Malformed("missing choices[0].message.content".into()))?;
        debug!(bytes = content.len(), "oracle replied");
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_oracle_extracts_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"content":"{\"score\": 40, \"recommendation\": \"walk\"}"}}]}"#,
            )
            .create_async()
            .await;

        let oracle = HttpOracle::new(
            &format!("{}/v1/chat/completions", server.url()),
            "test-model",
            Some("secret".into()),
        );
        let text = oracle.ask("prompt").await.unwrap();
        assert_eq!(text, r#"{"score": 40, "recommendation": "walk"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_oracle_reports_status_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let oracle = HttpOracle::new(&server.url(), "m", None);
        match oracle.ask("prompt").await {
            Err(AdvisoryError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_oracle_always_fails() {
        assert!(matches!(
            DisabledOracle.ask("x").await,
            Err(AdvisoryError::Disabled)
        ));
    }
}

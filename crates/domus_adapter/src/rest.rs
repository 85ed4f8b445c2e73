//! Request/response reasoning adapter.
//!
//! Posts every forwarded event to the service's `/engine/logger` route; the
//! service may answer with an explanation in the same response, which the
//! router then treats as a push candidate. Explicit requests go to
//! `/engine/explanation`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::{ContextSnapshot, ReasoningAdapter};

#[derive(Debug, Clone)]
pub struct RestAdapter {
    client: Client,
    base_url: String,
}

/// Response shape of both engine routes.
#[derive(Debug, Deserialize)]
struct EngineResponse {
    #[serde(default)]
    show_explanation: bool,
    #[serde(default)]
    explanation: Option<String>,
}

impl RestAdapter {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<Option<String>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach reasoning engine at {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Reasoning engine error {}: {}", status, err_text);
        }

        let parsed: EngineResponse = response
            .json()
            .await
            .context("Malformed reasoning engine response")?;
        if parsed.show_explanation {
            Ok(parsed.explanation)
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl ReasoningAdapter for RestAdapter {
    async fn log_event(&self, snapshot: ContextSnapshot) -> Result<Option<String>> {
        let body = serde_json::to_value(&snapshot)?;
        self.post("/engine/logger", &body).await
    }

    async fn request_explanation(
        &self,
        session_id: &str,
        user_message: Option<&str>,
    ) -> Result<Option<String>> {
        let body = json!({
            "user_id": session_id,
            "message": user_message,
        });
        self.post("/engine/explanation", &body).await
    }
}

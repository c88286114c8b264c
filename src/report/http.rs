#![cfg(feature = "sink-http")]

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use super::{ItemRequest, ItemSink};

#[derive(Debug, Deserialize)]
struct CreatedItem {
    id: i64,
}

/// POSTs create-item requests as JSON and expects `{"id": <int>}` back.
pub struct HttpItemSink {
    agent: ureq::Agent,
    endpoint: url::Url,
    bearer_token: Option<String>,
}

impl HttpItemSink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint)
            .with_context(|| format!("invalid items endpoint {}", endpoint))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(anyhow!("items endpoint must be http(s), got {}", endpoint.scheme()));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            agent,
            endpoint,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: String) -> Self {
        self.bearer_token = Some(token);
        self
    }
}

impl ItemSink for HttpItemSink {
    fn name(&self) -> &'static str {
        "http"
    }

    fn create_item(&self, request: &ItemRequest) -> Result<i64> {
        let mut call = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/json");
        if let Some(token) = &self.bearer_token {
            call = call.set("Authorization", &format!("Bearer {}", token));
        }
        let response = call
            .send_json(request)
            .map_err(|e| anyhow!("create item request failed: {}", e))?;
        let created: CreatedItem = response
            .into_json()
            .context("items service returned an unexpected body")?;
        Ok(created.id)
    }
}

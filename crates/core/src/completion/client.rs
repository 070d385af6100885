//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, instrument, warn};

use super::CompletionService;
use crate::config::CompletionConfig;
use crate::errors::CompletionError;

const SYSTEM_PROMPT: &str = "You are a merge-conflict resolution assistant. \
Reply with the merged code only, inside a single fenced code block.";

/// Asynchronous client for a `/chat/completions` endpoint.
#[derive(Clone)]
pub struct HttpCompletionClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl HttpCompletionClient {
    /// Build a client from the `[completion]` config section.
    ///
    /// The API key must already be resolved (see
    /// [`AppConfig::resolve_env_vars`](crate::config::AppConfig::resolve_env_vars)).
    /// A missing key is allowed for local servers that do not check auth.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        if !config.enabled {
            return Err(CompletionError::NotConfigured(
                "completion.enabled is false".into(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("mergemend/", env!("CARGO_PKG_VERSION"))),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if config.api_key.is_none() {
            warn!(env = %config.api_key_env, "no completion API key resolved, sending unauthenticated requests");
        }

        let api_url = config.api_url.trim_end_matches('/').to_string();
        info!(api_url = %api_url, model = %config.model, "created completion client");

        Ok(Self {
            http,
            api_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_url)
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "stream": false,
        })
    }
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let mut req = self.http.post(self.endpoint()).json(&self.request_body(prompt));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, "completion API returned error");
            return Err(CompletionError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let content = extract_message_content(&body)?;
        debug!(len = content.len(), "received completion");
        Ok(content)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
pub(crate) fn extract_message_content(body: &serde_json::Value) -> Result<String, CompletionError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            CompletionError::MalformedResponse("missing choices[0].message.content".into())
        })
}

use crate::error::ChatError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Translates user input into the engine's working language before
/// retrieval. Source language is auto-detected by the service.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, ChatError>;
}

/// Pass-through used when translation is disabled.
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str) -> Result<String, ChatError> {
        Ok(text.to_string())
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a LibreTranslate-style `/translate` endpoint.
pub struct HttpTranslator {
    endpoint: String,
    target: String,
    client: reqwest::Client,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            target: target.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, text: &str) -> Result<String, ChatError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&TranslateRequest {
                q: text,
                source: "auto",
                target: &self.target,
            })
            .send()
            .await
            .map_err(|err| ChatError::Translation(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ChatError::Translation(format!(
                "translation endpoint returned {}",
                response.status()
            )));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|err| ChatError::Translation(err.to_string()))?;

        debug!(target = %self.target, "input translated");
        Ok(parsed.translated_text)
    }
}

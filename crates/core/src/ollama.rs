use crate::error::ChatError;
use async_trait::async_trait;
use futures::future;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

/// A finite, non-restartable sequence of generated text chunks. Consumers
/// drain it fully before acting on the response.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// The language-model runtime as the pipeline sees it: model discovery plus
/// buffered and streaming generation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn list_models(&self) -> Result<Vec<String>, ChatError>;

    async fn generate(&self, prompt: &str) -> Result<String, ChatError>;

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ChatError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// HTTP client for an Ollama-compatible runtime.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_generate(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, ChatError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChatError::BackendResponse {
                backend: "ollama".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: TagsResponse = response.json().await?;
        Ok(parsed.models.into_iter().map(|tag| tag.name).collect())
    }

    async fn generate(&self, prompt: &str) -> Result<String, ChatError> {
        let response = self.post_generate(prompt, false).await?;
        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream, ChatError> {
        let response = self.post_generate(prompt, true).await?;
        debug!(model = %self.model, "generation stream opened");

        let decoded = response
            .bytes_stream()
            .scan(LineDecoder::default(), |decoder, item| {
                if decoder.finished {
                    return future::ready(None);
                }
                let out = match item {
                    Ok(bytes) => match decoder.push(&bytes) {
                        Ok(text) => Some(Ok(text)),
                        Err(err) => {
                            decoder.finished = true;
                            Some(Err(err))
                        }
                    },
                    Err(err) => {
                        decoder.finished = true;
                        Some(Err(ChatError::Http(err)))
                    }
                };
                future::ready(out)
            })
            .filter(|item| future::ready(!matches!(item, Ok(text) if text.is_empty())));

        Ok(Box::pin(decoded))
    }
}

/// Buffers raw bytes into NDJSON lines and concatenates the `response`
/// field of each complete line. Stops at the record marked `done`.
#[derive(Default)]
struct LineDecoder {
    buffer: String,
    finished: bool,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> Result<String, ChatError> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut text = String::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let parsed: GenerateLine = serde_json::from_str(line)?;
            text.push_str(&parsed.response);
            if parsed.done {
                self.finished = true;
                break;
            }
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_concatenates_complete_lines() {
        let mut decoder = LineDecoder::default();
        let text = decoder
            .push(b"{\"response\":\"Hel\"}\n{\"response\":\"lo\"}\n")
            .unwrap();
        assert_eq!(text, "Hello");
        assert!(!decoder.finished);
    }

    #[test]
    fn decoder_buffers_partial_lines_across_pushes() {
        let mut decoder = LineDecoder::default();
        assert_eq!(decoder.push(b"{\"respon").unwrap(), "");
        assert_eq!(decoder.push(b"se\":\"Hi\"}\n").unwrap(), "Hi");
    }

    #[test]
    fn decoder_stops_at_the_done_record() {
        let mut decoder = LineDecoder::default();
        let text = decoder
            .push(b"{\"response\":\"end\",\"done\":true}\n{\"response\":\"extra\"}\n")
            .unwrap();
        assert_eq!(text, "end");
        assert!(decoder.finished);
    }

    #[test]
    fn decoder_rejects_malformed_lines() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"not json\n").is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let client = OllamaClient::new("http://127.0.0.1:1", "test-model");
        assert!(client.list_models().await.is_err());
        assert!(client.generate("hi").await.is_err());
        assert!(client.generate_stream("hi").await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running Ollama instance"]
    async fn integration_list_models_returns_names() {
        let client = OllamaClient::new("http://localhost:11434", "llama3");
        let models = client.list_models().await.unwrap();
        assert!(!models.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires a running Ollama instance"]
    async fn integration_stream_matches_buffered_generation() {
        let client = OllamaClient::new("http://localhost:11434", "llama3");

        let buffered = client.generate("Reply with exactly: pong").await.unwrap();

        let mut stream = client
            .generate_stream("Reply with exactly: pong")
            .await
            .unwrap();
        let mut streamed = String::new();
        while let Some(chunk) = stream.next().await {
            streamed.push_str(&chunk.unwrap());
        }

        assert!(buffered.to_lowercase().contains("pong"));
        assert!(streamed.to_lowercase().contains("pong"));
    }
}

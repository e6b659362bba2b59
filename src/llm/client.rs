//! HTTP client for the document-understanding collaborator.
//!
//! Supports Ollama (`/api/generate`) and OpenAI-compatible chat completion
//! endpoints. Every call carries an explicit timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::EvidenceSnippet;

use super::config::{LlmConfig, LlmProvider};
use super::prompts::output_schema;
use super::response::{parse_report, QualitativeReport};

/// Errors from the collaborator. None of these abort a takeoff.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("document understanding is disabled")]
    Disabled,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// What is sent to the collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnderstandingRequest {
    pub system_prompt: String,
    pub evidence_snippets: Vec<EvidenceSnippet>,
    pub output_schema: serde_json::Value,
}

impl UnderstandingRequest {
    /// Build a request from snippets, keeping at most `max_snippets`.
    pub fn new(config: &LlmConfig, mut snippets: Vec<EvidenceSnippet>) -> Self {
        snippets.truncate(config.max_snippets);
        Self {
            system_prompt: config.get_system_prompt().to_string(),
            evidence_snippets: snippets,
            output_schema: output_schema(),
        }
    }

    /// User message: schema and snippets as JSON.
    fn user_prompt(&self) -> String {
        let snippets = serde_json::to_string_pretty(&self.evidence_snippets).unwrap_or_default();
        let schema = serde_json::to_string_pretty(&self.output_schema).unwrap_or_default();
        format!(
            "Output schema:\n{}\n\nEvidence snippets:\n{}",
            schema, snippets
        )
    }
}

/// An opaque qualitative reviewer of evidence snippets.
#[async_trait]
pub trait DocumentUnderstanding: Send + Sync {
    async fn understand(
        &self,
        request: &UnderstandingRequest,
    ) -> Result<QualitativeReport, CollaboratorError>;
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// HTTP collaborator client.
pub struct DocumentUnderstandingClient {
    config: LlmConfig,
    client: Client,
}

impl DocumentUnderstandingClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| CollaboratorError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    /// Get the config.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the service answers at all.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = match self.config.provider {
            LlmProvider::Ollama => format!("{}/api/tags", self.config.endpoint),
            LlmProvider::OpenAI => format!("{}/v1/models", self.config.endpoint),
        };
        let mut req = self.client.get(&url);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn call_ollama(&self, request: &UnderstandingRequest) -> Result<String, CollaboratorError> {
        let body = OllamaRequest {
            model: &self.config.model,
            system: &request.system_prompt,
            prompt: request.user_prompt(),
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::MalformedResponse(e.to_string()))?;
        Ok(parsed.response)
    }

    async fn call_openai(&self, request: &UnderstandingRequest) -> Result<String, CollaboratorError> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt(),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.config.endpoint);
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| self.classify(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| CollaboratorError::MalformedResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CollaboratorError::MalformedResponse("no choices".to_string()))
    }

    fn classify(&self, e: reqwest::Error) -> CollaboratorError {
        if e.is_timeout() {
            CollaboratorError::Timeout(self.config.timeout_secs)
        } else {
            CollaboratorError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl DocumentUnderstanding for DocumentUnderstandingClient {
    async fn understand(
        &self,
        request: &UnderstandingRequest,
    ) -> Result<QualitativeReport, CollaboratorError> {
        if !self.config.enabled {
            return Err(CollaboratorError::Disabled);
        }

        debug!(
            "sending {} snippets to {} ({:?})",
            request.evidence_snippets.len(),
            self.config.model,
            self.config.provider
        );

        let call = async {
            match self.config.provider {
                LlmProvider::Ollama => self.call_ollama(request).await,
                LlmProvider::OpenAI => self.call_openai(request).await,
            }
        };
        let raw = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), call)
            .await
            .map_err(|_| CollaboratorError::Timeout(self.config.timeout_secs))??;

        let report = parse_report(&raw)?;
        info!(
            "collaborator returned {} entries, {} review flags",
            report.entries.len(),
            report.review_flags.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvidenceKind;

    fn snippet(i: u32) -> EvidenceSnippet {
        EvidenceSnippet {
            filename: "plans.pdf".to_string(),
            page: i,
            kind: EvidenceKind::Schedule,
            text: format!("D{} EXIT SIGN QTY 4", i),
        }
    }

    #[test]
    fn test_request_shape() {
        let config = LlmConfig {
            max_snippets: 2,
            ..Default::default()
        };
        let request = UnderstandingRequest::new(&config, (1..=5).map(snippet).collect());
        assert_eq!(request.evidence_snippets.len(), 2);

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("systemPrompt").is_some());
        assert!(json.get("evidenceSnippets").is_some());
        assert!(json.get("outputSchema").is_some());
        assert!(request.user_prompt().contains("D1 EXIT SIGN QTY 4"));
    }

    #[tokio::test]
    async fn test_disabled_client() {
        let client = DocumentUnderstandingClient::new(LlmConfig::default()).unwrap();
        assert!(!client.is_available().await);
        let request = UnderstandingRequest::new(client.config(), vec![snippet(1)]);
        assert!(matches!(
            client.understand(&request).await,
            Err(CollaboratorError::Disabled)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let config = LlmConfig {
            enabled: true,
            timeout_secs: 2,
            ..Default::default()
        }
        .with_endpoint("http://127.0.0.1:9");
        let client = DocumentUnderstandingClient::new(config).unwrap();
        let request = UnderstandingRequest::new(client.config(), vec![snippet(1)]);
        let err = client.understand(&request).await.unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::Connection(_) | CollaboratorError::Timeout(_)
        ));
    }
}

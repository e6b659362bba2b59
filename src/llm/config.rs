//! Document-understanding collaborator configuration.

use serde::{Deserialize, Serialize};

/// LLM provider type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local, default)
    #[default]
    Ollama,
    /// OpenAI-compatible API (OpenAI, Groq, Together.ai, etc.)
    OpenAI,
}

impl LlmProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "groq" | "together" => Some(Self::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAI => "https://api.openai.com",
        }
    }
}

/// Configuration for the optional qualitative pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Off unless explicitly enabled.
    pub enabled: bool,
    pub provider: LlmProvider,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    /// Hard limit on one collaborator call, in seconds.
    pub timeout_secs: u64,
    /// Maximum evidence snippets sent per call.
    pub max_snippets: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Custom system prompt; the built-in one is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: LlmProvider::default(),
            endpoint: LlmProvider::default().default_endpoint().to_string(),
            api_key: None,
            model: "llama3.1:8b".to_string(),
            timeout_secs: 120,
            max_snippets: 60,
            temperature: 0.1,
            max_tokens: 2048,
            system_prompt: None,
        }
    }
}

impl LlmConfig {
    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENABLED`: "true"/"1" or anything else for false
    /// - `LLM_PROVIDER`: "ollama", "openai", "groq" or "together"
    /// - `LLM_ENDPOINT`: API endpoint (defaults based on provider)
    /// - `LLM_API_KEY`: API key for OpenAI-compatible providers
    /// - `LLM_MODEL`: model name
    /// - `LLM_TIMEOUT_SECS`: per-call timeout
    ///
    /// With `LLM_PROVIDER=openai` and no `LLM_API_KEY`, `OPENAI_API_KEY` is used.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        let explicit_endpoint = std::env::var("LLM_ENDPOINT").ok();
        if let Ok(val) = std::env::var("LLM_PROVIDER") {
            if let Some(provider) = LlmProvider::parse(&val) {
                if explicit_endpoint.is_none() {
                    self.endpoint = match val.to_lowercase().as_str() {
                        "groq" => "https://api.groq.com/openai".to_string(),
                        "together" => "https://api.together.xyz".to_string(),
                        _ => provider.default_endpoint().to_string(),
                    };
                }
                self.provider = provider;
            }
        }
        if let Some(endpoint) = explicit_endpoint {
            self.endpoint = endpoint;
        }

        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.api_key = Some(val);
        } else if self.api_key.is_none() && self.provider == LlmProvider::OpenAI {
            self.api_key = std::env::var("OPENAI_API_KEY").ok();
        }

        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.model = val;
        }
        if let Ok(val) = std::env::var("LLM_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.timeout_secs = n;
            }
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Get the system prompt, using custom or default.
    pub fn get_system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(super::prompts::DEFAULT_SYSTEM_PROMPT)
    }
}

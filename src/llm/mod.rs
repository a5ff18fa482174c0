mod ollama;
mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Incremental text fragments, in generation order
pub type TextStream = BoxStream<'static, LlmResult<String>>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Request to generate the AI's next guess
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The composed prompt (history plus latest clue)
    pub prompt: String,
    /// Game instructions, sent as a system message where supported
    pub system_prompt: Option<String>,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    /// Timeout for the request
    pub timeout: Duration,
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct GenerateResponse {
    /// The generated text
    pub text: String,
    /// Provider-specific metadata (model used, tokens consumed, etc.)
    pub metadata: ResponseMetadata,
}

/// Metadata about the LLM response
#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    /// Name of the provider (e.g., "openai", "ollama")
    pub provider: String,
    /// Model name used
    pub model: String,
    /// Tokens consumed (if available)
    pub tokens_used: Option<u32>,
    /// Latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a complete answer in one response
    async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse>;

    /// Open an incremental stream of answer fragments.
    ///
    /// Dropping the returned stream cancels the generation.
    async fn generate_stream(&self, request: GenerateRequest) -> LlmResult<TextStream>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Manager for the configured LLM providers, tried in order
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    /// Create a new LLM manager with the given providers
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    /// Generate from the first provider that succeeds
    pub async fn generate(&self, request: GenerateRequest) -> LlmResult<(String, GenerateResponse)> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.generate(request.clone()).await {
                Ok(response) => return Ok((provider.name().to_string(), response)),
                Err(e) => {
                    tracing::error!("Provider {} failed: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::ConfigError("No LLM providers".to_string())))
    }

    /// Open a stream on the first provider that accepts the request.
    ///
    /// Failover only happens before the first fragment; once a stream is
    /// open its errors belong to the caller.
    pub async fn stream(&self, request: GenerateRequest) -> LlmResult<(String, TextStream)> {
        let mut last_error = None;
        for provider in &self.providers {
            match provider.generate_stream(request.clone()).await {
                Ok(stream) => {
                    tracing::debug!("Streaming from provider {}", provider.name());
                    return Ok((provider.name().to_string(), stream));
                }
                Err(e) => {
                    tracing::error!("Provider {} failed to open stream: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::ConfigError("No LLM providers".to_string())))
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for single-shot requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_base_url: Some("http://localhost:11434".to_string()),
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: 256,
        }
    }
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let openai_model = std::env::var("OPENAI_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        // Explicitly empty OLLAMA_BASE_URL disables Ollama
        let ollama_base_url = match std::env::var("OLLAMA_BASE_URL") {
            Ok(url) => {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.trim_end_matches('/').to_string())
            }
            Err(_) => Some("http://localhost:11434".to_string()),
        };

        let ollama_model = std::env::var("OLLAMA_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "llama3.2".to_string());

        Self {
            openai_api_key,
            openai_model,
            ollama_base_url,
            ollama_model,
            default_timeout: std::env::var("LLM_TIMEOUT")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
            default_max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(256),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        // Add OpenAI if API key is available
        if let Some(api_key) = &self.openai_api_key {
            providers.push(Box::new(OpenAiProvider::new(
                api_key.clone(),
                self.openai_model.clone(),
            )));
        }

        // Add Ollama if base URL is available
        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )?));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct Failing;

    #[async_trait]
    impl LlmProvider for Failing {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Err(LlmError::ApiError("down".to_string()))
        }

        async fn generate_stream(&self, _request: GenerateRequest) -> LlmResult<TextStream> {
            Err(LlmError::ApiError("down".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        async fn generate(&self, request: GenerateRequest) -> LlmResult<GenerateResponse> {
            Ok(GenerateResponse {
                text: request.prompt,
                metadata: ResponseMetadata {
                    provider: "echo".to_string(),
                    model: "echo".to_string(),
                    tokens_used: None,
                    latency_ms: 0,
                },
            })
        }

        async fn generate_stream(&self, request: GenerateRequest) -> LlmResult<TextStream> {
            let words: Vec<LlmResult<String>> = request
                .prompt
                .split_inclusive(' ')
                .map(|w| Ok(w.to_string()))
                .collect();
            Ok(futures::stream::iter(words).boxed())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.to_string(),
            system_prompt: None,
            max_tokens: None,
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.ollama_model, "llama3.2");
        assert_eq!(config.default_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_manager_fails_over_to_next_provider() {
        let manager = LlmManager::new(vec![Box::new(Failing), Box::new(Echo)]);

        let (provider, response) = manager.generate(request("Is it Stalin?")).await.unwrap();
        assert_eq!(provider, "echo");
        assert_eq!(response.text, "Is it Stalin?");

        let (provider, stream) = manager.stream(request("Is it Stalin?")).await.unwrap();
        assert_eq!(provider, "echo");
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["Is ", "it ", "Stalin?"]);
    }

    #[tokio::test]
    async fn test_manager_reports_last_error() {
        let manager = LlmManager::new(vec![Box::new(Failing)]);
        assert!(matches!(
            manager.stream(request("x")).await,
            Err(LlmError::ApiError(_))
        ));

        let empty = LlmManager::new(Vec::new());
        assert!(matches!(
            empty.generate(request("x")).await,
            Err(LlmError::ConfigError(_))
        ));
    }
}

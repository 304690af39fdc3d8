use std::time::Duration;

use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::gemini;

use crate::domain::{ports::LlmService, DomainError};
use crate::infrastructure::config::{Credentials, LlmConfig};

/// Hosted Gemini chat model. One request per call, no retries.
#[derive(Clone)]
pub struct GeminiLlm {
    client: gemini::Client,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl GeminiLlm {
    /// Fails with a configuration error when the API key is absent, before
    /// any client is built.
    pub fn new(credentials: &Credentials, config: &LlmConfig) -> Result<Self, DomainError> {
        credentials.require_llm()?;
        Ok(Self {
            client: gemini::Client::from_env(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl LlmService for GeminiLlm {
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        let agent = self
            .client
            .agent(&self.model)
            .temperature(self.temperature)
            .build();

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "calling llm");

        tokio::time::timeout(self.timeout, agent.prompt(prompt))
            .await
            .map_err(|_| DomainError::timeout(format!("{} did not answer in time", self.model)))?
            .map_err(|e| DomainError::external(e.to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

//! Configured chat model
//!
//! `ChatModel` wraps whichever concrete provider the configuration selects and
//! binds the model name and temperature, so agents never repeat them.

use super::*;
use crate::config::Configuration;

enum Backend {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

/// A provider with model and temperature bound as request defaults
pub struct ChatModel {
    backend: Backend,
    model: String,
    temperature: f32,
}

impl ChatModel {
    /// Build a model from an explicit provider config
    pub fn new(config: ProviderConfig, model: impl Into<String>, temperature: f32) -> Result<Self> {
        let backend = match config.provider_type {
            ProviderType::OpenAI | ProviderType::Local => Backend::OpenAI(OpenAIProvider::new(config)?),
            ProviderType::Anthropic => Backend::Anthropic(AnthropicProvider::new(config)?),
        };
        Ok(Self {
            backend,
            model: model.into(),
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    fn bind(&self, mut request: CompletionRequest) -> CompletionRequest {
        if request.model.is_none() {
            request.model = Some(self.model.clone());
        }
        if request.temperature.is_none() {
            request.temperature = Some(self.temperature);
        }
        request
    }
}

impl LlmProvider for ChatModel {
    fn name(&self) -> &str {
        match &self.backend {
            Backend::OpenAI(p) => p.name(),
            Backend::Anthropic(p) => p.name(),
        }
    }

    fn models(&self) -> Vec<String> {
        match &self.backend {
            Backend::OpenAI(p) => p.models(),
            Backend::Anthropic(p) => p.models(),
        }
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
        let request = self.bind(request);
        match &self.backend {
            Backend::OpenAI(p) => p.complete(request).await,
            Backend::Anthropic(p) => p.complete(request).await,
        }
    }
}

/// Initialise the chat model named by the configuration.
///
/// Credentials come from the environment (see [`ProviderConfig::from_env`]).
pub fn init_chat_model(config: &Configuration) -> Result<ChatModel> {
    let (provider_type, model) = config.resolved_provider()?;
    let provider_config = ProviderConfig::from_env(provider_type)?.with_model(model.clone());

    tracing::debug!(
        provider = %provider_type,
        model = %model,
        temperature = config.temperature,
        "initialised chat model"
    );

    ChatModel::new(provider_config, model, config.temperature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_fills_missing_fields_only() {
        let model = ChatModel::new(ProviderConfig::openai("sk-test"), "gpt-4o-mini", 0.0).unwrap();

        let bound = model.bind(CompletionRequest::new(vec![ChatMessage::user("hi")]));
        assert_eq!(bound.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(bound.temperature, Some(0.0));

        let bound = model.bind(
            CompletionRequest::new(vec![ChatMessage::user("hi")])
                .with_model("gpt-4o")
                .with_temperature(0.7),
        );
        assert_eq!(bound.model.as_deref(), Some("gpt-4o"));
        assert_eq!(bound.temperature, Some(0.7));
    }

    #[test]
    fn test_backend_selection() {
        let model = ChatModel::new(ProviderConfig::anthropic("sk-ant"), "claude-sonnet-4-20250514", 0.2).unwrap();
        assert_eq!(model.name(), "anthropic");
        assert_eq!(model.default_model(), "claude-sonnet-4-20250514");

        let model = ChatModel::new(ProviderConfig::local("http://localhost:11434/v1", "llama3.3"), "llama3.3", 0.0).unwrap();
        assert_eq!(model.name(), "local");
    }
}

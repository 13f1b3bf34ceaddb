//! Runtime configuration
//!
//! Each configurable field is resolved from, in order of precedence:
//! 1. the environment variable named after the field in upper case
//!    (`MODEL_PROVIDER`, `MODEL`, `TEMPERATURE`)
//! 2. the caller's [`RunnableConfig::configurable`] map
//! 3. the field default

use crate::error::{Error, Result};
use crate::provider::ProviderType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_model_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// The configurable fields of the mentor app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Provider of the LLM (e.g. anthropic, openai)
    #[serde(default = "default_model_provider")]
    pub model_provider: String,

    /// Name of the LLM to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature setting for the LLM
    #[serde(default)]
    pub temperature: f32,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            model_provider: default_model_provider(),
            model: default_model(),
            temperature: 0.0,
        }
    }
}

/// Per-invocation options handed to the app by its caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnableConfig {
    #[serde(default)]
    pub configurable: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursion_limit: Option<usize>,
}

impl RunnableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a configurable value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configurable.insert(key.into(), value.into());
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }
}

impl Configuration {
    /// Resolve configuration from the process environment and `config`
    pub fn from_runnable_config(config: Option<&RunnableConfig>) -> Result<Self> {
        let empty = Map::new();
        let configurable = config.map(|c| &c.configurable).unwrap_or(&empty);
        Self::from_sources(configurable, |name| std::env::var(name).ok())
    }

    /// Resolve configuration with an injectable environment lookup
    pub fn from_sources(
        configurable: &Map<String, Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let raw = |field: &str| -> Option<Value> {
            env(&field.to_uppercase())
                .map(Value::String)
                .or_else(|| configurable.get(field).filter(|v| !v.is_null()).cloned())
        };

        let mut resolved = Self::default();
        if let Some(value) = raw("model_provider") {
            resolved.model_provider = coerce_string("model_provider", value)?;
        }
        if let Some(value) = raw("model") {
            resolved.model = coerce_string("model", value)?;
        }
        if let Some(value) = raw("temperature") {
            resolved.temperature = coerce_f32("temperature", value)?;
        }

        Ok(resolved)
    }

    /// The provider and bare model name to use.
    ///
    /// A `"<provider>:<model>"` model name overrides `model_provider` when the
    /// prefix names a known provider.
    pub fn resolved_provider(&self) -> Result<(ProviderType, String)> {
        if let Some((prefix, name)) = self.model.split_once(':') {
            if let Some(provider) = ProviderType::parse(prefix) {
                return Ok((provider, name.to_string()));
            }
        }

        let provider = ProviderType::parse(&self.model_provider).ok_or_else(|| {
            Error::config_invalid(
                "model_provider",
                format!("unsupported model provider '{}'", self.model_provider),
            )
            .with_operation("config::resolved_provider")
        })?;

        Ok((provider, self.model.clone()))
    }
}

fn coerce_string(field: &'static str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::config_invalid(field, format!("expected a string, got {}", other))
            .with_operation("config::from_sources")),
    }
}

fn coerce_f32(field: &'static str, value: Value) -> Result<f32> {
    let parsed = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.map(|v| v as f32).ok_or_else(|| {
        Error::config_invalid(field, format!("expected a number, got {}", value))
            .with_operation("config::from_sources")
    })
}

/// Semantic index settings for the memory store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Embedding vector length
    pub dims: usize,
    /// Embedding model as `"<provider>:<model>"`
    pub embed: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dims: 1536,
            embed: "openai:text-embedding-3-small".to_string(),
        }
    }
}

impl IndexConfig {
    pub fn new(dims: usize, embed: impl Into<String>) -> Self {
        Self { dims, embed: embed.into() }
    }
}

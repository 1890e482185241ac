// ABOUTME: Model adapter module — uniform chat protocol over heterogeneous LLM providers.
// ABOUTME: Tagged-variant adapters plus the factory that builds one from config.

pub mod adapter;
pub mod message;

pub use adapter::{
    AnthropicAdapter, LocalAdapter, ModelAdapter, ModelOptions, ModelResponse, OpenAIAdapter,
    StopReason, ToolSchema, Usage,
};
pub use message::{Message, Role, ToolCallRef};

use crate::config::LlmConfig;

/// Build a model adapter from config, resolving the API key from the
/// provider-specific environment variable. Mirrors the teacher's
/// `agent::provider::create_client` match-on-provider-name factory.
pub fn create_adapter(config: &LlmConfig, model_override: Option<&str>) -> anyhow::Result<ModelAdapter> {
    let model = model_override.unwrap_or(&config.model).to_string();

    match config.provider.as_str() {
        "anthropic" => {
            let api_key = std::env::var("ANTHROPIC_API_KEY")
                .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY not set"))?;
            let mut adapter = AnthropicAdapter::new(model, api_key);
            if let Some(url) = config.anthropic.base_url.as_deref().filter(|s| !s.is_empty()) {
                adapter = adapter.with_base_url(url);
            }
            Ok(ModelAdapter::Anthropic(adapter))
        }
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
            let mut adapter = OpenAIAdapter::new(model, api_key);
            if let Some(url) = config.openai.base_url.as_deref().filter(|s| !s.is_empty()) {
                adapter = adapter.with_base_url(url);
            }
            Ok(ModelAdapter::OpenAI(adapter))
        }
        "local" => {
            let base_url = config
                .local
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string());
            Ok(ModelAdapter::Local(LocalAdapter::new(model, base_url)))
        }
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Expected: anthropic, openai, local",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_errors() {
        let config = LlmConfig {
            provider: "fakeprovider".to_string(),
            ..Default::default()
        };
        let result = create_adapter(&config, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("fakeprovider"));
    }

    #[test]
    fn local_provider_needs_no_api_key() {
        let config = LlmConfig {
            provider: "local".to_string(),
            ..Default::default()
        };
        let adapter = create_adapter(&config, None).unwrap();
        assert_eq!(adapter.model_id(), config.model);
    }

    #[test]
    fn model_override_takes_precedence() {
        let config = LlmConfig {
            provider: "local".to_string(),
            ..Default::default()
        };
        let adapter = create_adapter(&config, Some("custom-model")).unwrap();
        assert_eq!(adapter.model_id(), "custom-model");
    }
}

pub mod gemini;
pub mod openai;

use std::sync::Arc;

use agentloop_runtime::ModelClient;

use crate::config::{ModelConfig, ProviderKind};
use crate::provider::LlmError;

/// Create the model client described by `config`.
pub fn create_model_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, LlmError> {
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());
    match config.provider {
        ProviderKind::Gemini => {
            let api_key = api_key.ok_or_else(|| {
                LlmError::NotConfigured(format!("{} not set", ProviderKind::Gemini.api_key_env()))
            })?;
            Ok(Arc::new(gemini::GeminiClient::new(api_key, config)))
        }
        ProviderKind::OpenAi => {
            // Self-hosted compatible servers usually take no key
            if api_key.is_none() && config.base_url.is_none() {
                return Err(LlmError::NotConfigured(format!(
                    "{} not set",
                    ProviderKind::OpenAi.api_key_env()
                )));
            }
            Ok(Arc::new(openai::OpenAiClient::new(api_key, config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_requires_key() {
        let err = create_model_client(&ModelConfig::default()).err().unwrap();
        assert!(matches!(err, LlmError::NotConfigured(ref m) if m.contains("GEMINI_API_KEY")));

        let blank = ModelConfig::default().with_api_key("  ");
        assert!(create_model_client(&blank).is_err());
    }

    #[test]
    fn test_creates_named_clients() {
        let gemini = create_model_client(&ModelConfig::default().with_api_key("k")).unwrap();
        assert_eq!(gemini.provider_name(), "gemini");

        let local = ModelConfig::new(ProviderKind::OpenAi).with_base_url("http://localhost:11434");
        let openai = create_model_client(&local).unwrap();
        assert_eq!(openai.provider_name(), "openai");
    }

    #[test]
    fn test_openai_default_endpoint_requires_key() {
        assert!(create_model_client(&ModelConfig::new(ProviderKind::OpenAi)).is_err());
    }
}

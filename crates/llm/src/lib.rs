//! Concrete [`ModelClient`](agentloop_runtime::ModelClient) backends.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::{ModelConfig, ProviderKind, DEFAULT_MAX_TOKENS};
pub use provider::LlmError;
pub use providers::create_model_client;
pub use providers::gemini::GeminiClient;
pub use providers::openai::OpenAiClient;

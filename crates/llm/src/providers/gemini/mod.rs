//! Google Gemini implementation of [`ModelClient`] using `generateContent`
//! with function calling.

mod translate;


use async_trait::async_trait;
use tracing::debug;

use agentloop_runtime::{ModelClient, ModelError, ModelResponse, ModelToolSpec, Turn};

use crate::config::ModelConfig;
use crate::provider::post_json;

use self::translate::{build_request_body, parse_response, GenerateContentResponse};

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl GeminiClient {
    pub fn new(api_key: String, config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            base_url: config.resolved_base_url(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ModelToolSpec],
    ) -> Result<ModelResponse, ModelError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = build_request_body(history, tools, self.max_tokens, self.temperature);

        debug!(model = %self.model, turns = history.len(), tools = tools.len(), "Gemini request");

        let request = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())]);
        let resp: GenerateContentResponse = post_json(request, &body).await?;
        parse_response(resp)
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

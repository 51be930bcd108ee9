use agentloop_runtime::ModelError;

/// Errors building a model client from configuration.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),
    #[error("unknown LLM provider: '{0}'")]
    UnknownProvider(String),
}

/// Map a non-success HTTP status onto the model error taxonomy.
pub(crate) fn error_for_status(status: u16, body: String, retry_after: Option<u64>) -> ModelError {
    match status {
        401 | 403 => ModelError::Auth,
        429 => ModelError::RateLimited {
            retry_after_secs: retry_after,
        },
        _ => ModelError::Api {
            status,
            message: body,
        },
    }
}

/// Read a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

pub(crate) fn network_error(err: reqwest::Error) -> ModelError {
    ModelError::Transport(err.to_string())
}

/// Id for a tool call the vendor did not label.
pub(crate) fn synthesize_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// POST `body` as JSON and return the parsed success body, or the mapped
/// error for any other status.
pub(crate) async fn post_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<T, ModelError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(network_error)?;

    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let retry = retry_after(response.headers());
        let body_text = response.text().await.unwrap_or_default();
        return Err(error_for_status(status, body_text, retry));
    }

    let text = response.text().await.map_err(network_error)?;
    serde_json::from_str(&text).map_err(|e| ModelError::InvalidResponse(e.to_string()))
}

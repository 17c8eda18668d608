//! OpenRouterProvider -- concrete [`LlmProvider`] for OpenAI-compatible
//! chat completion endpoints (OpenRouter by default).
//!
//! Sends `POST {base_url}/chat/completions` with bearer authentication and
//! the `HTTP-Referer` / `X-Title` attribution headers. Supports both
//! non-streaming (`complete`) and SSE streaming (`stream`) modes.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building request headers.

pub mod streaming;
pub mod types;

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use secrecy::{ExposeSecret, SecretString};

use parley_core::llm::provider::LlmProvider;
use parley_types::config::ProviderSettings;
use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, ResponseMeta, StreamEvent};

use self::streaming::create_openrouter_stream;
use self::types::{ChatRequest, ChatResponse};

/// OpenAI-compatible model transport.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    referer: Option<String>,
    title: String,
    timeout: Duration,
}

// OpenRouterProvider intentionally does NOT derive Debug so the client and
// key never end up in log output.

impl OpenRouterProvider {
    /// Create a provider from connection settings and an API key.
    pub fn new(api_key: SecretString, settings: &ProviderSettings) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            referer: settings.referer.clone(),
            title: settings.title.clone(),
            timeout,
        })
    }

    /// Create a provider reading the key from `settings.api_key_env`.
    pub fn from_env(settings: &ProviderSettings) -> Result<Self, LlmError> {
        let key = std::env::var(&settings.api_key_env).map_err(|_| {
            LlmError::InvalidRequest(format!(
                "environment variable {} is not set",
                settings.api_key_env
            ))
        })?;
        Self::new(SecretString::from(key), settings)
    }

    /// Override the base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build an authenticated POST for the given body.
    fn post(&self, body: &ChatRequest) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .header("X-Title", &self.title)
            .json(body);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        builder
    }
}

/// Map a non-2xx response to an [`LlmError`]; pass successes through.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, body = %body, "chat completion API error response");

    Err(status_error(status.as_u16(), retry_after_ms, body))
}

fn status_error(status: u16, retry_after_ms: Option<u64>, body: String) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    #[tracing::instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ChatRequest::from_completion(request, false);

        let response = self
            .post(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;
        let response = check_status(response).await?;
        let status = response.status().as_u16();

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(LlmError::Provider {
                message: error.message.unwrap_or_else(|| "provider returned an error".to_string()),
            });
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            meta: ResponseMeta {
                status,
                id: parsed.id,
                model: parsed.model,
                usage: parsed.usage.unwrap_or_default().into(),
            },
        })
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        let body = ChatRequest::from_completion(&request, true);
        create_openrouter_stream(self.post(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenRouterProvider {
        OpenRouterProvider::new(
            SecretString::from("sk-test".to_string()),
            &ProviderSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_url_joins_base_and_path() {
        let p = provider().with_base_url("http://localhost:8080/v1/");
        assert_eq!(p.url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_default_url_targets_openrouter() {
        assert_eq!(provider().url(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn test_post_sets_auth_and_attribution_headers() {
        let settings = ProviderSettings {
            referer: Some("https://parley.example".to_string()),
            ..ProviderSettings::default()
        };
        let p = OpenRouterProvider::new(SecretString::from("sk-test".to_string()), &settings).unwrap();
        let body = ChatRequest::from_completion(&CompletionRequest::from_turns("m", &[], false), false);

        let request = p.post(&body).build().unwrap();
        let headers = request.headers();
        assert_eq!(headers["authorization"], "Bearer sk-test");
        assert_eq!(headers["x-title"], "Parley");
        assert_eq!(headers["http-referer"], "https://parley.example");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(401, None, String::new()),
            LlmError::AuthenticationFailed
        ));
        assert!(matches!(
            status_error(429, Some(2000), String::new()),
            LlmError::RateLimited {
                retry_after_ms: Some(2000)
            }
        ));
        match status_error(502, None, "bad gateway".to_string()) {
            LlmError::Provider { message } => assert_eq!(message, "HTTP 502: bad gateway"),
            other => panic!("expected Provider error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_env_missing_variable() {
        let settings = ProviderSettings {
            api_key_env: "PARLEY_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ProviderSettings::default()
        };
        let err = OpenRouterProvider::from_env(&settings).err().unwrap();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}

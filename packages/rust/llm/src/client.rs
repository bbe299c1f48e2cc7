//! OpenAI-compatible chat-completions client.

use std::future::Future;
use std::time::Duration;

use jbook_shared::{AppConfig, JbookError, Result, validate_api_key};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::retry::{RetryPolicy, should_retry};

/// How much of an error body is kept in error messages.
const ERROR_BODY_EXCERPT: usize = 500;

/// A chat model that answers a system + user prompt pair.
pub trait ChatClient: Send + Sync {
    /// Model identifier, used as part of cache keys.
    fn model(&self) -> &str;

    /// Send one system/user exchange and return the assistant content.
    fn chat(&self, system: &str, user: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Connection settings for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl LlmClientConfig {
    /// Build from application config, reading the API key from the
    /// configured environment variable.
    pub fn from_app_config(config: &AppConfig, model: Option<&str>) -> Result<Self> {
        let api_key = validate_api_key(config)?;
        Ok(Self {
            base_url: config.llm.base_url.clone(),
            api_key,
            model: model.unwrap_or(&config.llm.default_model).to_string(),
            timeout: Duration::from_secs(config.llm.timeout_secs),
            retry: RetryPolicy {
                max_retries: config.llm.max_retries,
                ..RetryPolicy::default()
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Chat client for OpenAI and API-compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    config: LlmClientConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("jbook/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| JbookError::Llm(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = self.endpoint();
        let request = ChatRequest {
            model: &self.config.model,
            temperature: 0.0,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };
        let policy = &self.config.retry;

        let mut attempt = 0u32;
        loop {
            let sent = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) if attempt < policy.max_retries && (e.is_connect() || e.is_timeout()) => {
                    let delay = policy.delay(attempt, None);
                    warn!(attempt, error = %e, ?delay, "chat request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(JbookError::Llm(format!("{url}: {e}"))),
            };

            let status = response.status();
            if status.is_success() {
                let body: ChatResponse = response
                    .json()
                    .await
                    .map_err(|e| JbookError::Llm(format!("invalid chat response: {e}")))?;
                let choice = body
                    .choices
                    .into_iter()
                    .next()
                    .ok_or_else(|| JbookError::Llm("chat response has no choices".into()))?;
                debug!(attempt, "chat completion received");
                return Ok(choice.message.content.unwrap_or_else(|| "{}".to_string()));
            }

            if attempt < policy.max_retries && should_retry(status) {
                let delay = policy.delay(attempt, Some(response.headers()));
                warn!(attempt, %status, ?delay, "chat request rejected, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(JbookError::Llm(format!("HTTP {status}: {excerpt}")));
        }
    }
}

impl ChatClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        self.complete(system, user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> LlmClientConfig {
        LlmClientConfig {
            base_url,
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_retries: 2,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
            },
        }
    }

    fn completion(content: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn sends_prompt_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "hello" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                serde_json::json!("{\"label\":\"High\",\"rationale\":\"x\"}"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(format!("{}/v1/", server.uri()))).unwrap();
        let out = client.chat("sys", "hello").await.unwrap();
        assert_eq!(out, "{\"label\":\"High\",\"rationale\":\"x\"}");
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn null_content_becomes_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion(serde_json::Value::Null)),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(server.uri())).unwrap();
        assert_eq!(client.chat("s", "u").await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                serde_json::json!("ok"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(server.uri())).unwrap();
        assert_eq!(client.chat("s", "u").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(server.uri())).unwrap();
        let err = client.chat("s", "u").await.unwrap_err().to_string();
        assert!(err.contains("500"), "{err}");
        assert!(err.contains("overloaded"), "{err}");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(server.uri())).unwrap();
        let err = client.chat("s", "u").await.unwrap_err();
        assert!(matches!(err, JbookError::Llm(ref m) if m.contains("bad key")));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(config(server.uri())).unwrap();
        assert!(client.chat("s", "u").await.is_err());
    }
}

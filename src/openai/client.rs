use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use super::error::OpenAiError;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A single prompt-in, text-out exchange with an inference endpoint.
///
/// The retrying task only depends on this trait, so tests can drive the
/// dispatcher with in-process fakes.
pub trait CompletionClient {
    fn complete(
        &self,
        prompt: &str,
        model: &str,
    ) -> impl Future<Output = Result<String, OpenAiError>> + Send;
}

/// Generation parameters fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

pub struct OpenAiClient {
    api_key: String,
    client: Client,
    endpoint: String,
    params: GenerationParams,
}

impl OpenAiClient {
    /// Create a client for any OpenAI-compatible server (the official API,
    /// vLLM, a hosted gateway, or a mock server in tests).
    pub fn with_base_url(
        api_key: String,
        base_url: &str,
        params: GenerationParams,
        timeout: Duration,
    ) -> Result<Self, OpenAiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            params,
        })
    }

    pub async fn chat_completion(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, OpenAiError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(OpenAiError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(OpenAiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<ChatCompletionResponse>().await?;
        Ok(body)
    }
}

impl CompletionClient for OpenAiClient {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, OpenAiError> {
        let req = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        };
        let response = self.chat_completion(&req).await?;
        response
            .first_text()
            .map(str::to_string)
            .ok_or(OpenAiError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAiClient {
        OpenAiClient::with_base_url(
            "sk-test".into(),
            &server.uri(),
            GenerationParams {
                temperature: 0.6,
                max_tokens: 128,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn completion_body(content: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test]
    async fn complete_sends_fixed_params_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "temperature": 0.6,
                "max_tokens": 128,
                "messages": [{"role": "user", "content": "tell a story"}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("once upon".into())),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server)
            .complete("tell a story", "test-model")
            .await
            .unwrap();
        assert_eq!(text, "once upon");
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x", "m").await.unwrap_err();
        assert!(matches!(
            err,
            OpenAiError::RateLimited {
                retry_after_ms: 3000
            }
        ));
    }

    #[tokio::test]
    async fn huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", "18446744073709552"),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x", "m").await.unwrap_err();
        assert!(matches!(
            err,
            OpenAiError::RateLimited {
                retry_after_ms: u64::MAX
            }
        ));
    }

    #[tokio::test]
    async fn server_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x", "m").await.unwrap_err();
        match err {
            OpenAiError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn null_content_is_empty_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body(serde_json::Value::Null)),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x", "m").await.unwrap_err();
        assert!(matches!(err, OpenAiError::EmptyCompletion));
    }

    #[tokio::test]
    async fn malformed_body_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).complete("x", "m").await.unwrap_err();
        assert!(matches!(err, OpenAiError::Network(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = OpenAiClient::with_base_url(
            "k".into(),
            "http://localhost:8000/v1/",
            GenerationParams::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.endpoint, "http://localhost:8000/v1/chat/completions");
    }
}

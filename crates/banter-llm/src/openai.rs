//! OpenAI-compatible streaming completion provider.
//!
//! Speaks the `chat/completions` SSE dialect (`stream: true`, incremental
//! `choices[0].delta.content`, explicit `data: [DONE]` terminator), which
//! most hosted and self-hosted completion endpoints accept.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use tracing::{debug, warn};

use banter_core::Role;

use crate::error_body::parse_api_error;
use crate::provider::{
    CompletionOptions, CompletionProvider, PromptMessage, ProviderError, StreamDelta, TokenStream,
};
use crate::sse::SseLineBuffer;

/// Streaming `chat/completions` client.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatProvider {
    /// Create a provider for the given endpoint and model.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn request_body(&self, messages: &[PromptMessage], options: &CompletionOptions) -> Value {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        json!({
            "model": self.model,
            "messages": wire_messages,
            "stream": true,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        })
    }

    /// Extract the text delta from one SSE payload, if any.
    fn delta_text(payload: &str) -> Option<String> {
        let json: Value = serde_json::from_str(payload).ok()?;
        json["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
    }

    fn retry_after_ms(response: &reqwest::Response) -> u64 {
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map_or(1000, |secs| secs * 1000)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn stream(
        &self,
        messages: &[PromptMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url, model = self.model, messages = messages.len(), "starting completion stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, options))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                message: parse_api_error(&body, status.as_u16()).message,
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = Self::retry_after_ms(&response);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            let info = parse_api_error(&body, code);
            return Err(ProviderError::Api {
                status: code,
                message: info.message,
                retryable: info.retryable,
            });
        }

        let mut byte_stream = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = SseLineBuffer::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "completion stream read error");
                        yield Err(ProviderError::Http(e));
                        return;
                    }
                };
                for payload in buffer.push(&chunk) {
                    if payload == "[DONE]" {
                        yield Ok(StreamDelta::Done);
                        return;
                    }
                    if let Some(text) = Self::delta_text(&payload) {
                        yield Ok(StreamDelta::Text(text));
                    }
                }
            }
            // Stream ended without [DONE]; treat a trailing payload, then
            // close normally.
            if let Some(payload) = buffer.finish() {
                if payload != "[DONE]" {
                    if let Some(text) = Self::delta_text(&payload) {
                        yield Ok(StreamDelta::Text(text));
                    }
                }
            }
            yield Ok(StreamDelta::Done);
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prompt() -> Vec<PromptMessage> {
        vec![
            PromptMessage::new(Role::System, "be brief"),
            PromptMessage::new(Role::User, "hello"),
        ]
    }

    fn sse_body(deltas: &[&str]) -> String {
        let mut body = String::new();
        for delta in deltas {
            body.push_str(&format!(
                "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{delta}\"}}}}]}}\n\n"
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    async fn collect(provider: &OpenAiCompatProvider) -> Result<Vec<StreamDelta>, ProviderError> {
        let mut stream = provider.stream(&prompt(), &CompletionOptions::default()).await?;
        let mut deltas = Vec::new();
        while let Some(item) = stream.next().await {
            deltas.push(item?);
        }
        Ok(deltas)
    }

    #[tokio::test]
    async fn streams_text_deltas_then_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer key"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&["Hel", "lo"])))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(server.uri(), "key", "test-model");
        let deltas = collect(&provider).await.unwrap();
        assert_eq!(
            deltas,
            vec![
                StreamDelta::Text("Hel".into()),
                StreamDelta::Text("lo".into()),
                StreamDelta::Done,
            ]
        );
    }

    #[tokio::test]
    async fn request_carries_model_and_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "max_tokens": 1024,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[])))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(server.uri(), "key", "test-model");
        let deltas = collect(&provider).await.unwrap();
        assert_eq!(deltas, vec![StreamDelta::Done]);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string(r#"{"error":{"type":"auth","message":"bad key"}}"#),
            )
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(server.uri(), "wrong", "m");
        let err = collect(&provider).await.unwrap_err();
        assert_matches!(err, ProviderError::Auth { .. });
    }

    #[tokio::test]
    async fn rate_limit_maps_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(server.uri(), "key", "m");
        let err = collect(&provider).await.unwrap_err();
        assert_matches!(err, ProviderError::RateLimited { retry_after_ms: 7000 });
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string(r#"{"error":{"type":"server_error","message":"boom"}}"#),
            )
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(server.uri(), "key", "m");
        let err = collect(&provider).await.unwrap_err();
        assert_matches!(
            err,
            ProviderError::Api { status: 500, retryable: true, .. }
        );
    }

    #[tokio::test]
    async fn missing_done_marker_still_completes() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(server.uri(), "key", "m");
        let deltas = collect(&provider).await.unwrap();
        assert_eq!(deltas, vec![StreamDelta::Text("hi".into()), StreamDelta::Done]);
    }

    #[tokio::test]
    async fn empty_and_role_only_deltas_are_skipped() {
        let server = MockServer::start().await;
        let body = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n\
                    data: [DONE]\n\n";
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(server.uri(), "key", "m");
        let deltas = collect(&provider).await.unwrap();
        assert_eq!(deltas, vec![StreamDelta::Text("ok".into()), StreamDelta::Done]);
    }

    #[test]
    fn delta_text_ignores_malformed_payloads() {
        assert_eq!(OpenAiCompatProvider::delta_text("not json"), None);
        assert_eq!(OpenAiCompatProvider::delta_text("{}"), None);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("http://x/v1/", "k", "m");
        assert_eq!(provider.base_url, "http://x/v1");
    }
}

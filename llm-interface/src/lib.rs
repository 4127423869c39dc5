//! Post summaries over an OpenAI-compatible chat-completions API.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use skyrelay_core::{truncate_summary, CoreError, Credentials, Summarizer, SummaryError};
use std::time::Duration;
use tracing::{debug, error, warn};

pub const OPENAI_API_BASE: &str = "https://api.openai.com";
const PROVIDER: &str = "openai";
const MAX_TOKENS: u32 = 100;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER_SECS: u64 = 20;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that writes very concise summaries.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiProvider {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Result<Self, CoreError> {
        Self::with_base_url(api_key, model, OPENAI_API_BASE.to_string())
    }

    pub fn from_credentials(credentials: &Credentials) -> Result<Self, CoreError> {
        Self::new(
            credentials.openai_api_key.clone(),
            credentials.openai_model.clone(),
        )
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Result<Self, CoreError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// The user prompt for one post.
pub fn build_prompt(title: &str, comments: &[String], max_chars: usize) -> String {
    format!(
        "Write a very brief 1-2 sentence summary (max {} characters) of this post and its comments.\n\
         Add 1-2 relevant emojis at the end. Keep it casual and engaging.\n\
         Don't mention reddit or subreddits.\n\n\
         Title: {}\n\n\
         Comments: {}",
        max_chars,
        title,
        comments.join("\n")
    )
}

fn status_error(status: StatusCode, retry_after: Option<u64>) -> SummaryError {
    let provider = PROVIDER.to_string();
    match status {
        StatusCode::UNAUTHORIZED => SummaryError::InvalidApiKey { provider },
        StatusCode::TOO_MANY_REQUESTS => SummaryError::RateLimitExceeded {
            provider,
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        s if s.is_server_error() => SummaryError::ServiceUnavailable { provider },
        s => SummaryError::Rejected {
            provider,
            status_code: s.as_u16(),
        },
    }
}

#[async_trait]
impl Summarizer for OpenAiProvider {
    async fn summarize(
        &self,
        title: &str,
        comments: &[String],
        max_chars: usize,
    ) -> Result<String, CoreError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(title, comments, max_chars),
                },
            ],
            max_tokens: MAX_TOKENS,
        };

        debug!("Requesting summary from {} for {:?}", self.model, title);
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::from(SummaryError::RequestTimeout {
                        provider: PROVIDER.to_string(),
                    })
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            warn!("Summary request failed with status {}", status);
            return Err(status_error(status, retry_after).into());
        }

        let invalid = || SummaryError::InvalidResponseFormat {
            provider: PROVIDER.to_string(),
        };
        let body: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat completion: {}", e);
            invalid()
        })?;
        let summary = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(invalid)?;

        Ok(truncate_summary(&summary, max_chars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skyrelay_core::ErrorExt;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::with_base_url("sk-test".to_string(), "gpt-4o".to_string(), server.uri())
            .unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
            ]
        })
    }

    #[test]
    fn test_prompt_contents() {
        let prompt = build_prompt("A cat", &["so cute".to_string(), "wow".to_string()], 250);
        assert!(prompt.contains("max 250 characters"));
        assert!(prompt.contains("Title: A cat"));
        assert!(prompt.contains("so cute\nwow"));
        assert!(prompt.contains("emojis"));
    }

    #[tokio::test]
    async fn test_summarize_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4o", "max_tokens": 100 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Cats rule 🐱  ")))
            .expect(1)
            .mount(&server)
            .await;

        let summary = provider(&server).summarize("A cat", &[], 250).await.unwrap();
        assert_eq!(summary, "Cats rule 🐱");
    }

    #[tokio::test]
    async fn test_long_summary_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&"x".repeat(300))))
            .mount(&server)
            .await;

        let summary = provider(&server).summarize("t", &[], 250).await.unwrap();
        assert_eq!(summary.chars().count(), 250);
        assert!(summary.ends_with("..."));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = provider(&server);

        let err = provider.summarize("t", &[], 250).await.unwrap_err();
        assert!(matches!(err, CoreError::Summary(SummaryError::InvalidApiKey { .. })));
        assert!(!err.is_retryable());

        let err = provider.summarize("t", &[], 250).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Summary(SummaryError::RateLimitExceeded { retry_after: 3, .. })
        ));
        assert!(err.is_retryable());

        let err = provider.summarize("t", &[], 250).await.unwrap_err();
        assert!(matches!(err, CoreError::Summary(SummaryError::ServiceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = provider(&server).summarize("t", &[], 250).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Summary(SummaryError::InvalidResponseFormat { .. })
        ));
    }
}

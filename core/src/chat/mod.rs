//! OpenAI-compatible chat completion client and the text translator on top of it.

pub mod retry;
pub mod text;

pub use retry::RetryPolicy;
pub use text::{
    auto_translates, detect_language, launch_text, target_language, user_prompt, ClipboardWatch,
    Language, TextTranslation, TextTranslator, TranslateMode,
};

use log::warn;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, SystemTime};
use thiserror::Error;

use retry::{evaluate_retry, parse_retry_after, Failure, RetryDecision};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Please configure an API key first")]
    MissingApiKey,
    #[error("Nothing to translate")]
    EmptyInput,
    /// Message reported by the API, or the HTTP status line.
    #[error("{0}")]
    Api(String),
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// One system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub system: String,
    pub user: String,
}

pub struct ChatClient {
    http: Client,
    policy: RetryPolicy,
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatClient {
    pub fn new() -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!("falling back to default HTTP client: {}", err);
                Client::new()
            });
        Self {
            http,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns `choices[0].message.content`, or an empty string when the
    /// response carries none.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        if request.api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey);
        }

        let url = completions_url(&request.base_url);
        let body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        let mut retries = 0;
        loop {
            let delay = match self
                .http
                .post(&url)
                .bearer_auth(request.api_key.trim())
                .json(&body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    let payload: Value = response.json().await?;
                    return Ok(message_content(&payload));
                }
                Ok(response) => {
                    let status = response.status();
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| parse_retry_after(value, SystemTime::now()));
                    let text = response.text().await.unwrap_or_default();
                    let decision = evaluate_retry(
                        Failure::Http {
                            status,
                            retry_after,
                        },
                        self.policy,
                        retries,
                    );
                    let RetryDecision::Retry { delay, .. } = decision else {
                        return Err(ChatError::Api(error_message(status, &text)));
                    };
                    warn!("chat completion returned {}, retrying in {:?}", status, delay);
                    delay
                }
                Err(err) => {
                    let failure = if err.is_timeout() || err.is_connect() {
                        Failure::Transport
                    } else {
                        Failure::Fatal
                    };
                    let RetryDecision::Retry { delay, .. } =
                        evaluate_retry(failure, self.policy, retries)
                    else {
                        return Err(ChatError::Network(err));
                    };
                    warn!("chat completion request failed ({}), retrying in {:?}", err, delay);
                    delay
                }
            };

            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }
}

/// `{base}/chat/completions`, tolerating a trailing slash on the base URL.
pub fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

fn message_content(payload: &Value) -> String {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// `error.message` from the body when the API sends one, otherwise
/// `"<code> <reason>"`.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let from_body = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match from_body {
        Some(message) if !message.trim().is_empty() => message,
        _ => format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        )
        .trim_end()
        .to_string(),
    }
}

//! Batched, rate-limited access to OpenRouter's
//! chat-completion API.
//!
//! Callers get raw text back; no schema is enforced. Parsing of the
//! pipe-delimited output contracts happens in the engine, which also
//! supplies defaults on parse failure.

use postfiat_config::{
    LLM_MAX_CONCURRENT_REQUESTS, LLM_REQUESTS_PER_MINUTE, LLM_TRANSIENT_RETRY_SECS,
    OPENROUTER_BASE_URL,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited by provider")]
    RateLimited,

    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("provider returned no choices")]
    EmptyResponse,

    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Arguments for one completion call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// The seam the engine drives; stubbed in tests.
#[async_trait::async_trait]
pub trait LlmGateway: Send + Sync {
    /// Single blocking completion.
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Run a keyed batch concurrently; results carry the caller's keys.
    /// Requests that keep failing after retries are absent from the result.
    async fn complete_batch(
        &self,
        requests: BTreeMap<String, ChatRequest>,
    ) -> BTreeMap<String, String>;
}

/// Sliding-window request pacing: at most `limit` starts per minute,
/// tracked as a timestamp ring.
struct RateWindow {
    timestamps: Mutex<VecDeque<Instant>>,
    limit: usize,
}

impl RateWindow {
    fn new(limit: usize) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    async fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.timestamps.lock().await;
                let now = Instant::now();
                while window
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= Duration::from_secs(60))
                {
                    window.pop_front();
                }
                if window.len() < self.limit {
                    window.push_back(now);
                    None
                } else {
                    window
                        .front()
                        .map(|t| Duration::from_secs(60).saturating_sub(now.duration_since(*t)))
                }
            };
            match wait {
                None => return,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
    }
}

/// OpenRouter-backed gateway.
pub struct OpenRouterGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    http_referer: String,
    concurrency: Arc<Semaphore>,
    rate: RateWindow,
    max_retries: usize,
}

impl OpenRouterGateway {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key: api_key.into(),
            http_referer: "postfiat.org".to_string(),
            concurrency: Arc::new(Semaphore::new(LLM_MAX_CONCURRENT_REQUESTS)),
            rate: RateWindow::new(LLM_REQUESTS_PER_MINUTE),
            max_retries: 5,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call_once(&self, request: &ChatRequest) -> Result<String> {
        self.rate.acquire().await;
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.http_referer)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if status.is_server_error() {
            return Err(LlmError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }

    /// Retry transient failures with a fixed pause, mirroring the queue's
    /// tolerance for provider flakiness.
    async fn call_with_retries(&self, request: &ChatRequest) -> Result<String> {
        let mut attempt = 0usize;
        loop {
            match self.call_once(request).await {
                Ok(text) => return Ok(text),
                Err(err @ (LlmError::RateLimited | LlmError::Transient(_) | LlmError::Http(_))) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(err);
                    }
                    warn!(%err, attempt, model = %request.model, "LLM call failed, retrying");
                    tokio::time::sleep(Duration::from_secs(LLM_TRANSIENT_RETRY_SECS)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait::async_trait]
impl LlmGateway for OpenRouterGateway {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let _permit = self.concurrency.acquire().await.expect("semaphore open");
        self.call_with_retries(&request).await
    }

    async fn complete_batch(
        &self,
        requests: BTreeMap<String, ChatRequest>,
    ) -> BTreeMap<String, String> {
        let futures: Vec<_> = requests
            .into_iter()
            .map(|(key, request)| {
                let semaphore = Arc::clone(&self.concurrency);
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore open");
                    debug!(job = %key, "LLM batch job start");
                    let outcome = self.call_with_retries(&request).await;
                    (key, outcome)
                }
            })
            .collect();

        let mut results = BTreeMap::new();
        for (key, outcome) in futures::future::join_all(futures).await {
            match outcome {
                Ok(text) => {
                    results.insert(key, text);
                }
                Err(err) => {
                    warn!(job = %key, %err, "LLM batch job failed, dropping");
                }
            }
        }
        results
    }
}

//! LLM Gateway (C3): a single abstraction over whichever provider is
//! configured, with automatic model fallback when a model is retired,
//! rate-limited, or out of quota. Every detector agent that wants LLM help
//! goes through this gateway rather than talking to a provider directly.

pub mod classifier;

use crate::error::{DqError, Result};
use crate::model::CancellationToken;
use async_trait::async_trait;
use classifier::{FailureClassifier, LlmFailureClass};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
    Claude,
}

impl Provider {
    /// Ordered fallback candidates, cheapest/fastest first. Gemini carries
    /// the richest list since it is the default provider.
    pub fn fallback_models(&self) -> &'static [&'static str] {
        match self {
            Provider::Gemini => &[
                "gemini-1.5-flash",
                "gemini-1.5-flash-8b",
                "gemini-1.5-flash-002",
                "gemini-1.5-pro",
                "gemini-1.5-pro-002",
                "gemini-1.0-pro",
                "gemini-pro",
                "gemini-2.0-flash-exp",
                "gemini-2.0-flash",
                "gemini-pro-vision",
            ],
            Provider::OpenAi => &["gpt-4o-mini", "gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"],
            Provider::Claude => &[
                "claude-3-5-haiku-latest",
                "claude-3-5-sonnet-latest",
                "claude-3-opus-latest",
            ],
        }
    }

    fn chat_endpoint(&self, model: &str) -> String {
        match self {
            Provider::Gemini => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            ),
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions".to_string(),
            Provider::Claude => "https://api.anthropic.com/v1/messages".to_string(),
        }
    }
}

/// Capability set every agent calls through. Kept as a trait (not a
/// concrete type) so tests can swap in `StubGateway`.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(&self, prompt: &str, cancel: &CancellationToken) -> Result<String>;

    /// Best-effort status snapshot for the run summary.
    fn quota_status(&self) -> Option<crate::model::QuotaStatus> {
        None
    }
}

struct GatewayState {
    current_model: String,
    failed_models: HashSet<String>,
    quota_exhausted_models: HashSet<String>,
}

/// Default gateway: HTTP calls to a configured provider, with sticky
/// model selection and session-scoped fallback bookkeeping.
pub struct ModelFallbackGateway {
    provider: Provider,
    api_key: String,
    http: reqwest::Client,
    state: Mutex<GatewayState>,
    max_quota_exhausted_before_cascade_cap: usize,
}

impl ModelFallbackGateway {
    pub fn new(provider: Provider, api_key: String, max_quota_exhausted_before_cascade_cap: usize) -> Self {
        let default_model = provider.fallback_models()[0].to_string();
        Self {
            provider,
            api_key,
            http: reqwest::Client::new(),
            state: Mutex::new(GatewayState {
                current_model: default_model,
                failed_models: HashSet::new(),
                quota_exhausted_models: HashSet::new(),
            }),
            max_quota_exhausted_before_cascade_cap,
        }
    }

    async fn candidates(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let all = self.provider.fallback_models();

        let mut ordered: Vec<String> = Vec::new();
        if !state.failed_models.contains(&state.current_model) && !state.quota_exhausted_models.contains(&state.current_model) {
            ordered.push(state.current_model.clone());
        }
        for m in all {
            if !ordered.contains(&m.to_string()) && !state.failed_models.contains(*m) && !state.quota_exhausted_models.contains(*m) {
                ordered.push(m.to_string());
            }
        }

        if state.quota_exhausted_models.len() >= self.max_quota_exhausted_before_cascade_cap {
            ordered.truncate(3);
        }
        ordered
    }

    async fn record_success(&self, model: &str) {
        let mut state = self.state.lock().await;
        state.current_model = model.to_string();
    }

    /// Transient failures (network blips, empty responses, 5xx) are never
    /// persisted — only Permanent and QuotaExhausted change which models
    /// `candidates()` offers for the rest of the session.
    async fn record_failure(&self, model: &str, class: LlmFailureClass) {
        let mut state = self.state.lock().await;
        match class {
            LlmFailureClass::Permanent => {
                state.failed_models.insert(model.to_string());
            }
            LlmFailureClass::QuotaExhausted => {
                state.quota_exhausted_models.insert(model.to_string());
            }
            LlmFailureClass::Transient => {}
        }
    }

    async fn call_model(&self, model: &str, prompt: &str) -> std::result::Result<String, (Option<u16>, String)> {
        let body = match self.provider {
            Provider::Gemini => serde_json::json!({
                "contents": [{"parts": [{"text": prompt}]}],
            }),
            Provider::OpenAi => serde_json::json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": "You are a precise JSON-only responder."},
                    {"role": "user", "content": prompt}
                ],
                "temperature": 0.1,
            }),
            Provider::Claude => serde_json::json!({
                "model": model,
                "max_tokens": 1024,
                "messages": [{"role": "user", "content": prompt}],
            }),
        };

        let url = self.provider.chat_endpoint(model);
        let mut request = self.http.post(&url).json(&body);
        request = match self.provider {
            Provider::Gemini => request.query(&[("key", &self.api_key)]),
            Provider::OpenAi => request.header("Authorization", format!("Bearer {}", self.api_key)),
            Provider::Claude => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
        };

        let response = request.send().await.map_err(|e| (None, e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| (Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err((Some(status.as_u16()), text));
        }

        let parsed: serde_json::Value = serde_json::from_str(&text).map_err(|e| (Some(status.as_u16()), e.to_string()))?;
        let content = match self.provider {
            Provider::Gemini => parsed["candidates"][0]["content"]["parts"][0]["text"].as_str(),
            Provider::OpenAi => parsed["choices"][0]["message"]["content"].as_str(),
            Provider::Claude => parsed["content"][0]["text"].as_str(),
        };

        content
            .map(|s| s.to_string())
            .ok_or_else(|| (Some(status.as_u16()), "no content in response".to_string()))
    }
}

#[async_trait]
impl LlmGateway for ModelFallbackGateway {
    async fn complete(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        let classifier = FailureClassifier::new();
        let candidates = self.candidates().await;

        if candidates.is_empty() {
            return Err(DqError::Agent {
                agent: "llm_gateway".to_string(),
                detail: "all candidate models exhausted or failed".to_string(),
            });
        }

        for model in &candidates {
            if cancel.is_cancelled() {
                return Err(DqError::Agent {
                    agent: "llm_gateway".to_string(),
                    detail: "cancelled".to_string(),
                });
            }

            match self.call_model(model, prompt).await {
                Ok(content) => {
                    self.record_success(model).await;
                    return Ok(content);
                }
                Err((status, message)) => {
                    let class = classifier.classify(status, &message);
                    warn!(model, ?class, %message, "llm call failed");
                    self.record_failure(model, class).await;
                }
            }
        }

        Err(DqError::Agent {
            agent: "llm_gateway".to_string(),
            detail: "all candidate models exhausted or failed".to_string(),
        })
    }

    fn quota_status(&self) -> Option<crate::model::QuotaStatus> {
        let state = self.state.try_lock().ok()?;
        let exhausted = !state.quota_exhausted_models.is_empty() || !state.failed_models.is_empty();
        let working_model =
            if state.failed_models.contains(&state.current_model) || state.quota_exhausted_models.contains(&state.current_model) {
                None
            } else {
                Some(state.current_model.clone())
            };
        let message = if exhausted {
            format!(
                "{} model(s) quota-exhausted, {} model(s) permanently failed",
                state.quota_exhausted_models.len(),
                state.failed_models.len()
            )
        } else {
            "all configured models are available".to_string()
        };
        Some(crate::model::QuotaStatus { exhausted, working_model, message })
    }
}

/// Scans `response` for the first balanced `{...}` or `[...]` span,
/// respecting string literals and escapes, and ignoring markdown code
/// fences around it. Returns `None` when nothing balances.
pub fn extract_json(response: &str) -> Option<String> {
    let bytes = response.as_bytes();
    let start = bytes.iter().position(|b| *b == b'{' || *b == b'[')?;

    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset;
                    return std::str::from_utf8(&bytes[start..=end]).ok().map(|s| s.to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Test double: maps regex patterns over the prompt to canned responses, in
/// order, falling back to an error when nothing matches or `unavailable` is
/// set. Lets detector tests exercise both the "LLM answered" and the
/// "LLM unavailable, degrade gracefully" paths deterministically.
pub struct StubGateway {
    responses: Vec<(regex::Regex, String)>,
    unavailable: std::sync::atomic::AtomicBool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            unavailable: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn with_response(mut self, pattern: &str, response: impl Into<String>) -> Self {
        self.responses.push((regex::Regex::new(pattern).unwrap(), response.into()));
        self
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for StubGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for StubGateway {
    async fn complete(&self, prompt: &str, _cancel: &CancellationToken) -> Result<String> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(DqError::Agent {
                agent: "llm_gateway".to_string(),
                detail: "stub marked unavailable".to_string(),
            });
        }
        for (pattern, response) in &self.responses {
            if pattern.is_match(prompt) {
                return Ok(response.clone());
            }
        }
        Err(DqError::Agent {
            agent: "llm_gateway".to_string(),
            detail: format!("no stub response configured for prompt: {prompt}"),
        })
    }
}

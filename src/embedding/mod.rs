//! Resilient client for a remote embedding service.
//!
//! [`EmbeddingClient`] turns texts into vectors one request per text,
//! grouping texts into fixed-size batches that may run concurrently. Each
//! text goes through its own sequential retry loop:
//!
//! - texts longer than `max_chars` are truncated before the first attempt
//! - HTTP 5xx → retry, shrinking the text by `shrink_factor` (never below `shrink_floor`)
//! - HTTP 429, network errors and unrecognized bodies → retry with the same text
//! - other HTTP 4xx → fail immediately
//! - backoff: `backoff_ms`, doubled after every failed attempt
//!
//! A text that exhausts its attempts fails on its own with
//! [`EmbedError::Exhausted`]; other texts in the batch are unaffected.
//!
//! The HTTP layer sits behind the [`EmbedTransport`] trait so the retry
//! policy can be driven by a scripted transport in tests.

pub mod shapes;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingApi, EmbeddingConfig};
use crate::error::EmbedError;

/// Raw HTTP outcome of one embedding request.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

/// Sends one text to the embedding service.
///
/// Implementations report network-level failures as
/// [`EmbedError::Transport`] and return every HTTP response, whatever its
/// status, as a [`TransportReply`].
#[async_trait]
pub trait EmbedTransport: Send + Sync {
    async fn send(&self, text: &str) -> Result<TransportReply, EmbedError>;
}

/// reqwest-backed transport for Ollama and OpenAI-compatible services.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api: EmbeddingApi,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        let base = config.url.trim_end_matches('/');
        let endpoint = match config.api {
            EmbeddingApi::Ollama => format!("{}/api/embeddings", base),
            EmbeddingApi::Openai => format!("{}/v1/embeddings", base),
        };
        let api_key = match config.api {
            EmbeddingApi::Openai => std::env::var("OPENAI_API_KEY").ok(),
            EmbeddingApi::Ollama => None,
        };
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            api: config.api,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbedTransport for HttpTransport {
    async fn send(&self, text: &str) -> Result<TransportReply, EmbedError> {
        let body = match self.api {
            EmbeddingApi::Ollama => serde_json::json!({ "model": self.model, "prompt": text }),
            EmbeddingApi::Openai => serde_json::json!({ "model": self.model, "input": text }),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbedError::Transport(format!("{} ({})", e, self.endpoint)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;
        Ok(TransportReply { status, body })
    }
}

/// A successfully embedded text.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded {
    pub vector: Vec<f32>,
    /// Characters actually sent on the successful attempt.
    pub sent_chars: usize,
    /// Whether the sent text was shorter than the input.
    pub truncated: bool,
}

/// Prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct EmbeddingClient {
    transport: Arc<dyn EmbedTransport>,
    batch_size: usize,
    concurrency: usize,
    max_chars: usize,
    max_attempts: u32,
    backoff: Duration,
    shrink_factor: f64,
    shrink_floor: usize,
}

impl EmbeddingClient {
    /// Client speaking HTTP to the configured service.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn with_transport(transport: Arc<dyn EmbedTransport>, config: &EmbeddingConfig) -> Self {
        Self {
            transport,
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            max_chars: config.max_chars,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            shrink_factor: config.shrink_factor,
            shrink_floor: config.shrink_floor,
        }
    }

    /// Embed every text, returning one result per input in input order.
    pub async fn embed_documents(&self, texts: &[String]) -> Vec<Result<Embedded, EmbedError>> {
        stream::iter(texts.chunks(self.batch_size))
            .map(|batch| async move {
                let mut out = Vec::with_capacity(batch.len());
                for text in batch {
                    out.push(self.embed_one(text).await);
                }
                out
            })
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_one(text).await.map(|e| e.vector)
    }

    /// Run the retry loop for a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Embedded, EmbedError> {
        let original_chars = text.chars().count();
        let mut current = truncate_chars(text, self.max_chars);
        let mut last_err = EmbedError::UnrecognizedShape;

        for attempt in 1..=self.max_attempts {
            let length = current.chars().count();
            match self.attempt(current).await {
                Ok(vector) => {
                    let truncated = length < original_chars;
                    tracing::debug!(length, truncated, "embed_ok");
                    return Ok(Embedded {
                        vector,
                        sent_chars: length,
                        truncated,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(length, attempts = attempt, error = %e, "embed_error");
                    return Err(e);
                }
                Err(e) => {
                    if attempt == self.max_attempts {
                        last_err = e;
                        break;
                    }
                    if e.should_shrink() && length > self.shrink_floor {
                        let target = ((length as f64 * self.shrink_factor) as usize)
                            .max(self.shrink_floor);
                        current = truncate_chars(current, target);
                    }
                    tracing::warn!(
                        attempt,
                        length = current.chars().count(),
                        error = %e,
                        "embed_retry"
                    );
                    tokio::time::sleep(self.backoff * 2u32.saturating_pow(attempt - 1)).await;
                    last_err = e;
                }
            }
        }

        tracing::error!(
            length = current.chars().count(),
            attempts = self.max_attempts,
            error = %last_err,
            "embed_error"
        );
        Err(EmbedError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(last_err),
        })
    }

    async fn attempt(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let reply = self.transport.send(text).await?;
        match reply.status {
            200..=299 => {
                let body: serde_json::Value = serde_json::from_str(&reply.body)
                    .map_err(|_| EmbedError::UnrecognizedShape)?;
                shapes::normalize(&body).ok_or(EmbedError::UnrecognizedShape)
            }
            429 => Err(EmbedError::RateLimited(reply.body)),
            500..=599 => Err(EmbedError::Server {
                status: reply.status,
                body: reply.body,
            }),
            status => Err(EmbedError::Rejected {
                status,
                body: reply.body,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every text it was sent.
    pub(crate) struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<TransportReply, EmbedError>>>,
        pub(crate) seen: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(replies: Vec<Result<TransportReply, EmbedError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EmbedTransport for ScriptedTransport {
        async fn send(&self, text: &str) -> Result<TransportReply, EmbedError> {
            self.seen.lock().unwrap().push(text.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EmbedError::Transport("script exhausted".into())))
        }
    }

    /// Answers `[len, 1.0]` for every text, or 500 when the text contains "FAIL".
    pub(crate) struct LengthTransport;

    #[async_trait]
    impl EmbedTransport for LengthTransport {
        async fn send(&self, text: &str) -> Result<TransportReply, EmbedError> {
            if text.contains("FAIL") {
                return Ok(reply(500, "boom"));
            }
            Ok(reply(
                200,
                &format!(r#"{{"embedding": [{}.0, 1.0]}}"#, text.chars().count()),
            ))
        }
    }

    pub(crate) fn reply(status: u16, body: &str) -> TransportReply {
        TransportReply {
            status,
            body: body.to_string(),
        }
    }

    pub(crate) fn fast_config() -> EmbeddingConfig {
        EmbeddingConfig {
            backoff_ms: 0,
            ..EmbeddingConfig::default()
        }
    }

    fn ok_reply() -> Result<TransportReply, EmbedError> {
        Ok(reply(200, r#"{"embedding": [0.1, 0.2, 0.3]}"#))
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("线性规划", 2), "线性");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[tokio::test]
    async fn test_long_text_truncated_before_first_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![ok_reply()]));
        let config = EmbeddingConfig {
            max_chars: 10,
            ..fast_config()
        };
        let client = EmbeddingClient::with_transport(transport.clone(), &config);

        let out = client.embed_one(&"x".repeat(25)).await.unwrap();
        assert!(out.truncated);
        assert_eq!(out.sent_chars, 10);
        assert_eq!(transport.seen.lock().unwrap()[0].len(), 10);
    }

    #[tokio::test]
    async fn test_server_error_shrinks_next_attempt() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(reply(502, "bad gateway")),
            Ok(reply(503, "unavailable")),
            ok_reply(),
        ]));
        let client = EmbeddingClient::with_transport(transport.clone(), &fast_config());

        let out = client.embed_one(&"y".repeat(2000)).await.unwrap();
        let lengths: Vec<usize> = transport
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.len())
            .collect();
        assert_eq!(lengths, vec![2000, 1200, 800]);
        assert_eq!(out.sent_chars, 800);
        assert!(out.truncated);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_same_text() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(reply(429, "slow down")),
            Err(EmbedError::Transport("connection reset".into())),
            ok_reply(),
        ]));
        let client = EmbeddingClient::with_transport(transport.clone(), &fast_config());

        let out = client.embed_one(&"z".repeat(1500)).await.unwrap();
        assert_eq!(out.vector, vec![0.1, 0.2, 0.3]);
        assert!(!out.truncated);
        assert!(transport.seen.lock().unwrap().iter().all(|t| t.len() == 1500));
    }

    #[tokio::test]
    async fn test_client_error_fails_without_retry() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(reply(404, "model not found")),
            ok_reply(),
        ]));
        let client = EmbeddingClient::with_transport(transport.clone(), &fast_config());

        let err = client.embed_one("text").await.unwrap_err();
        assert!(matches!(err, EmbedError::Rejected { status: 404, .. }));
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_after_max_attempts() {
        let transport = Arc::new(ScriptedTransport::new(
            (0..10).map(|_| Ok(reply(500, "down"))).collect(),
        ));
        let client = EmbeddingClient::with_transport(transport.clone(), &fast_config());

        let err = client.embed_one("short").await.unwrap_err();
        match err {
            EmbedError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, EmbedError::Server { status: 500, .. }));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        // Below the shrink floor the text is resent unchanged.
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|t| t == "short"));
    }

    #[tokio::test]
    async fn test_unrecognized_body_is_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(reply(200, "not json")),
            Ok(reply(200, r#"{"status": "loading"}"#)),
            ok_reply(),
        ]));
        let client = EmbeddingClient::with_transport(transport.clone(), &fast_config());
        assert!(client.embed_query("q").await.is_ok());
        assert_eq!(transport.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_text_does_not_fail_siblings() {
        let config = EmbeddingConfig {
            batch_size: 2,
            concurrency: 2,
            ..fast_config()
        };
        let client = EmbeddingClient::with_transport(Arc::new(LengthTransport), &config);
        let texts: Vec<String> = ["a", "bb", "FAIL", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let results = client.embed_documents(&texts).await;
        assert_eq!(results.len(), 5);
        assert!(matches!(results[2], Err(EmbedError::Exhausted { .. })));
        // Output order follows input order across concurrent batches.
        for (i, expected) in [(0, 1.0), (1, 2.0), (3, 4.0), (4, 5.0)] {
            assert_eq!(results[i].as_ref().unwrap().vector[0], expected);
        }
    }

    #[test]
    fn test_http_endpoint_per_api() {
        let ollama = HttpTransport::from_config(&EmbeddingConfig {
            url: "http://localhost:11434/".into(),
            ..EmbeddingConfig::default()
        })
        .unwrap();
        assert_eq!(ollama.endpoint(), "http://localhost:11434/api/embeddings");

        let openai = HttpTransport::from_config(&EmbeddingConfig {
            api: EmbeddingApi::Openai,
            url: "https://api.example.com".into(),
            ..EmbeddingConfig::default()
        })
        .unwrap();
        assert_eq!(openai.endpoint(), "https://api.example.com/v1/embeddings");
    }
}

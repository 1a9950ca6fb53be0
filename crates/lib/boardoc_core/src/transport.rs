//! Retrying HTTP transport for calls to the whiteboard platform and the
//! document server.
//!
//! Every call runs under one overall deadline shared by all attempts and the
//! backoff sleeps between them, so retries never stretch total latency past
//! the configured ceiling.
//!
//! # Retry eligibility
//!
//! - connection failures, per-request timeouts and 5xx responses are retried;
//! - 4xx responses are returned immediately as [`TransportError::Rejected`];
//! - nothing is retried once the caller's [`CancellationToken`] fires.
//!
//! Backoff doubles with each attempt from `initial_backoff`, capped at
//! `max_backoff`, plus 0–50% random jitter. A backoff that would cross the
//! deadline is not taken.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest rejected-response body kept for diagnostics.
const MAX_ERROR_BODY: usize = 512;

/// Retry and deadline policy.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Wall-clock ceiling across all attempts.
    pub deadline: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            deadline: Duration::from_secs(5),
        }
    }
}

/// Why a single attempt failed in a retryable way.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("server error: HTTP {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request rejected: HTTP {status}")]
    Rejected { status: StatusCode, body: String },

    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: AttemptFailure,
    },

    #[error("deadline exceeded after {attempts} attempt(s)")]
    DeadlineExceeded {
        attempts: u32,
        last: Option<AttemptFailure>,
    },

    #[error("request cancelled")]
    Cancelled { attempts: u32 },

    #[error("invalid request: {0}")]
    Invalid(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Status of a rejected (4xx) response.
    pub fn rejected_status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the upstream could not be reached within the retry budget.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::DeadlineExceeded { .. })
    }
}

/// HTTP client wrapper applying the retry and deadline policy.
#[derive(Debug, Clone)]
pub struct RetryableTransport {
    client: Client,
    config: TransportConfig,
}

impl RetryableTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: TransportConfig) -> Self {
        Self { client, config }
    }

    /// Send the request built by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt, since a sent request is consumed.
    pub async fn execute<F>(
        &self,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<Response, TransportError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let deadline = Instant::now() + self.config.deadline;
        self.execute_until(deadline, cancel, &build)
            .await
            .map(|(resp, _)| resp)
    }

    /// Like [`execute`](Self::execute), also decoding the JSON body within
    /// the same deadline.
    pub async fn send_json<T, F>(
        &self,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let deadline = Instant::now() + self.config.deadline;
        let (resp, attempts) = self.execute_until(deadline, cancel, &build).await?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled { attempts }),
            body = timeout_at(deadline, resp.json::<T>()) => match body {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TransportError::Decode(e.to_string())),
                Err(_) => Err(TransportError::DeadlineExceeded { attempts, last: None }),
            },
        }
    }

    async fn execute_until<F>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        build: &F,
    ) -> Result<(Response, u32), TransportError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last: Option<AttemptFailure> = None;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled { attempts: attempt });
            }
            attempt += 1;

            let send = build(&self.client).send();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempt, "outbound request cancelled");
                    return Err(TransportError::Cancelled { attempts: attempt });
                }
                res = timeout_at(deadline, send) => res,
            };

            let failure = match outcome {
                Err(_) => {
                    warn!(attempt, "outbound request hit deadline");
                    return Err(TransportError::DeadlineExceeded {
                        attempts: attempt,
                        last,
                    });
                }
                Ok(Err(e)) if e.is_builder() => return Err(TransportError::Invalid(e)),
                Ok(Err(e)) => AttemptFailure::Network(e),
                Ok(Ok(resp)) if resp.status().is_server_error() => {
                    AttemptFailure::Status(resp.status())
                }
                Ok(Ok(resp)) if resp.status().is_client_error() => {
                    let status = resp.status();
                    let body = read_error_body(resp, deadline).await;
                    debug!(attempt, %status, "outbound request rejected");
                    return Err(TransportError::Rejected { status, body });
                }
                Ok(Ok(resp)) => {
                    if attempt > 1 {
                        debug!(attempt, "outbound request succeeded after retry");
                    }
                    return Ok((resp, attempt));
                }
            };

            if attempt >= max_attempts {
                warn!(attempt, error = %failure, "outbound request retries exhausted");
                return Err(TransportError::Exhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.backoff(attempt);
            if Instant::now() + delay >= deadline {
                warn!(attempt, error = %failure, "no time left for another attempt");
                return Err(TransportError::DeadlineExceeded {
                    attempts: attempt,
                    last: Some(failure),
                });
            }

            debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "transient failure, retrying after backoff",
            );
            last = Some(failure);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(TransportError::Cancelled { attempts: attempt });
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// Backoff before attempt `attempt + 1`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let base = exp.min(self.config.max_backoff);
        let jitter_ms = (base.as_millis() as u64) / 2;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        base + jitter
    }
}

/// At most [`MAX_ERROR_BODY`] bytes of a rejected response, cut at a
/// character boundary. The rest of the body is never read.
async fn read_error_body(mut resp: Response, deadline: Instant) -> String {
    let mut buf: Vec<u8> = Vec::with_capacity(MAX_ERROR_BODY);
    while buf.len() < MAX_ERROR_BODY {
        match timeout_at(deadline, resp.chunk()).await {
            Ok(Ok(Some(chunk))) => {
                let take = chunk.len().min(MAX_ERROR_BODY - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            _ => break,
        }
    }
    match std::str::from_utf8(&buf) {
        Ok(text) => text.to_string(),
        Err(e) => String::from_utf8_lossy(&buf[..e.valid_up_to()]).into_owned(),
    }
}

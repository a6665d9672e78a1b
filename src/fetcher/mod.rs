//! HTTP fetcher with rate limiting, retries, and backoff
//!
//! One [`Fetcher`] instance serves the whole invocation. Every attempt
//! waits on the shared rate limiter first, then issues a GET with the
//! configured user-agent and per-request timeout and reads the entire
//! body. Failed attempts are classified: transport-level failures, 429,
//! and 5xx are retried with exponential backoff; invalid URLs, timeouts,
//! cancellation, and other 4xx are terminal.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::clock::Clock;
use crate::limiter::RateLimiter;

const BASE_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(2);

/// A received HTTP response with its full body.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Terminal fetch failure, after any retries.
///
/// `HttpStatus` still carries the response so callers can read headers and
/// body (asset sizing needs them even for 4xx/5xx outcomes).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("request timed out")]
    Timeout,

    #[error("operation canceled")]
    Canceled,

    #[error("{message}")]
    Transport { message: String },

    #[error("read body: {message}")]
    ReadBody { status: u16, message: String },

    #[error("{text}")]
    HttpStatus {
        status: u16,
        text: String,
        response: FetchResponse,
    },
}

impl FetchError {
    /// HTTP status associated with the failure; 0 when no response was
    /// received.
    pub fn status(&self) -> u16 {
        match self {
            FetchError::ReadBody { status, .. } | FetchError::HttpStatus { status, .. } => *status,
            _ => 0,
        }
    }

    /// The response carried by an HTTP-status failure, if any.
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            FetchError::HttpStatus { response, .. } => Some(response),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::ReadBody { .. } => true,
            FetchError::HttpStatus { status, .. } => retryable_status(*status),
            FetchError::InvalidUrl(_) | FetchError::Timeout | FetchError::Canceled => false,
        }
    }
}

fn retryable_status(status: u16) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS.as_u16() || status >= 500
}

/// Canonical reason phrase for a status code, with a fallback for codes
/// that have none.
pub fn status_text(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("http status {status}"))
}

/// Performs HTTP GETs with retries and rate limiting.
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    user_agent: String,
    limiter: Option<RateLimiter>,
    retries: u32,
    retry_delay: Duration,
    clock: Arc<dyn Clock>,
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        timeout: Duration,
        user_agent: String,
        limiter: Option<RateLimiter>,
        retries: u32,
        retry_delay: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry_delay = if retry_delay.is_zero() {
            BASE_RETRY_DELAY
        } else {
            retry_delay
        };

        Self {
            client,
            timeout,
            user_agent,
            limiter,
            retries,
            retry_delay,
            clock,
        }
    }

    /// Fetches `raw_url`, retrying temporary failures.
    ///
    /// Total attempts are `retries + 1`; the last attempt's outcome is
    /// returned even when it is an error. Cancellation is reported as
    /// [`FetchError::Canceled`] and never retried.
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        raw_url: &str,
    ) -> Result<FetchResponse, FetchError> {
        let attempts = self.retries + 1;

        for attempt in 0..attempts {
            let outcome = self.fetch_once(cancel, raw_url).await;

            if let Ok(response) = &outcome {
                if response.status < 400 {
                    if cancel.is_cancelled() {
                        return Err(FetchError::Canceled);
                    }

                    return outcome;
                }
            }

            if cancel.is_cancelled() {
                return Err(outcome.err().unwrap_or(FetchError::Canceled));
            }

            let retryable = match &outcome {
                Ok(response) => retryable_status(response.status),
                Err(err) => err.is_retryable(),
            };

            if !retryable || attempt == attempts - 1 {
                return finalize(outcome);
            }

            tracing::debug!(
                url = raw_url,
                attempt = attempt + 1,
                "retrying after failed fetch attempt"
            );

            self.clock
                .sleep(cancel, self.retry_delay_for(attempt + 1))
                .await
                .map_err(|_| FetchError::Canceled)?;
        }

        Err(FetchError::Canceled)
    }

    async fn fetch_once(
        &self,
        cancel: &CancellationToken,
        raw_url: &str,
    ) -> Result<FetchResponse, FetchError> {
        if let Some(limiter) = &self.limiter {
            limiter
                .wait(cancel)
                .await
                .map_err(|_| FetchError::Canceled)?;
        }

        self.do_request(cancel, raw_url).await
    }

    async fn do_request(
        &self,
        cancel: &CancellationToken,
        raw_url: &str,
    ) -> Result<FetchResponse, FetchError> {
        let parsed =
            Url::parse(raw_url).map_err(|err| FetchError::InvalidUrl(err.to_string()))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let mut request = self.client.get(parsed.as_str());
        if !self.timeout.is_zero() {
            request = request.timeout(self.timeout);
        }
        if !self.user_agent.is_empty() {
            request = request.header(USER_AGENT, &self.user_agent);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Canceled),
            sent = request.send() => sent.map_err(classify_send_error)?,
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Canceled),
            read = response.bytes() => read.map_err(|err| FetchError::ReadBody {
                status,
                message: err.to_string(),
            })?,
        };

        Ok(FetchResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }

    /// Backoff before retry attempt `attempt` (1-based): the base delay
    /// doubled per prior retry, capped at two seconds.
    fn retry_delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let mut delay = self.retry_delay;

        for _ in 1..attempt {
            if delay >= MAX_RETRY_DELAY {
                return MAX_RETRY_DELAY;
            }

            delay *= 2;
        }

        delay.min(MAX_RETRY_DELAY)
    }
}

/// Turns an HTTP response with status >= 400 into the error callers
/// inspect; anything else passes through.
fn finalize(outcome: Result<FetchResponse, FetchError>) -> Result<FetchResponse, FetchError> {
    match outcome {
        Ok(response) if response.status >= 400 => {
            let status = response.status;

            Err(FetchError::HttpStatus {
                status,
                text: status_text(status),
                response,
            })
        }
        other => other,
    }
}

fn classify_send_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }

    if err.is_builder() {
        return FetchError::InvalidUrl(err.to_string());
    }

    FetchError::Transport {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn fetcher_with_delay(retry_delay: Duration) -> Fetcher {
        Fetcher::new(
            reqwest::Client::new(),
            Duration::from_secs(1),
            "test-agent".to_string(),
            None,
            3,
            retry_delay,
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let fetcher = fetcher_with_delay(Duration::from_millis(100));

        assert_eq!(fetcher.retry_delay_for(1), Duration::from_millis(100));
        assert_eq!(fetcher.retry_delay_for(2), Duration::from_millis(200));
        assert_eq!(fetcher.retry_delay_for(3), Duration::from_millis(400));
        assert_eq!(fetcher.retry_delay_for(6), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_delay_defaults_to_base() {
        let fetcher = fetcher_with_delay(Duration::ZERO);
        assert_eq!(fetcher.retry_delay_for(1), BASE_RETRY_DELAY);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(retryable_status(429));
        assert!(retryable_status(500));
        assert!(retryable_status(503));
        assert!(!retryable_status(404));
        assert!(!retryable_status(403));
        assert!(!retryable_status(200));
    }

    #[test]
    fn test_error_classification() {
        assert!(FetchError::Transport {
            message: "connection reset".to_string()
        }
        .is_retryable());
        assert!(FetchError::ReadBody {
            status: 200,
            message: "unexpected eof".to_string()
        }
        .is_retryable());
        assert!(!FetchError::Timeout.is_retryable());
        assert!(!FetchError::Canceled.is_retryable());
        assert!(!FetchError::InvalidUrl("nope".to_string()).is_retryable());
    }

    #[test]
    fn test_status_text_known_and_unknown() {
        assert_eq!(status_text(404), "Not Found");
        assert_eq!(status_text(599), "http status 599");
    }

    #[test]
    fn test_error_status_accessor() {
        let err = FetchError::HttpStatus {
            status: 404,
            text: status_text(404),
            response: FetchResponse {
                status: 404,
                headers: HeaderMap::new(),
                body: Vec::new(),
            },
        };
        assert_eq!(err.status(), 404);
        assert_eq!(err.to_string(), "Not Found");

        assert_eq!(
            FetchError::Transport {
                message: "x".to_string()
            }
            .status(),
            0
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_terminal() {
        let fetcher = fetcher_with_delay(Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let err = fetcher.fetch(&cancel, "ftp://example.com/x").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));

        let err = fetcher.fetch(&cancel, "not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_cancelled_fetch_reports_cancellation() {
        let fetcher = fetcher_with_delay(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher
            .fetch(&cancel, "https://example.com/")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Canceled));
    }
}

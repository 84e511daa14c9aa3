//! Blocking client for the local generation service.
//!
//! The [`GenerateClient`] trait decouples the pipeline from the HTTP backend
//! (currently an Ollama-style `POST /api/generate`). Tests use scripted
//! clients that replay queued completions without touching the network.
//!
//! Transient failures are retried with fixed blocking delays; everything
//! else fails immediately. The retry loop dispatches on the [`Attempt`] tag
//! rather than downcasting a blanket error type.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::PipelineConfig;

/// Delay before retrying after a refused connection.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Delay before retrying after a request timeout.
pub const TIMEOUT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Errors surfaced by [`GenerateClient::generate`].
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// The service never accepted a connection within the retry bound.
    #[error("cannot reach generation service at {endpoint}; make sure the model server is running locally")]
    Unreachable { endpoint: String },

    /// Every attempt exceeded the fixed request timeout.
    #[error("generation request timed out")]
    TimedOut,

    /// Any other failure, including non-2xx responses. Never retried.
    #[error("generation API error: {message}")]
    Api { message: String },
}

/// Abstraction over generation backends.
pub trait GenerateClient {
    /// Send one prompt and return the completion text verbatim.
    ///
    /// No validation is applied to the returned text; the build stage is
    /// the de facto validator of generated code.
    fn generate(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Why a failed attempt is eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Connection refused or otherwise unreachable.
    Unreachable,
    /// The request exceeded the fixed timeout.
    TimedOut,
}

impl RetryReason {
    fn delay(self) -> Duration {
        match self {
            RetryReason::Unreachable => CONNECT_RETRY_DELAY,
            RetryReason::TimedOut => TIMEOUT_RETRY_DELAY,
        }
    }

    fn exhausted(self, endpoint: &str) -> GenerateError {
        match self {
            RetryReason::Unreachable => GenerateError::Unreachable {
                endpoint: endpoint.to_string(),
            },
            RetryReason::TimedOut => GenerateError::TimedOut,
        }
    }
}

/// Outcome of a single generation attempt.
#[derive(Debug)]
pub enum Attempt {
    Ok(String),
    Retryable(RetryReason),
    Fatal(GenerateError),
}

/// Drive `attempt` until success, a fatal failure, or the retry bound.
///
/// Makes at most `max_retries` attempts (the first attempt counts). After a
/// retryable failure with attempts remaining, calls `sleep` with the delay
/// for that reason; the last retryable reason determines the terminal error.
pub fn run_with_retry<A, S>(
    endpoint: &str,
    max_retries: u32,
    mut attempt: A,
    mut sleep: S,
) -> Result<String, GenerateError>
where
    A: FnMut(u32) -> Attempt,
    S: FnMut(Duration),
{
    let mut last_reason = None;
    for n in 1..=max_retries {
        match attempt(n) {
            Attempt::Ok(text) => return Ok(text),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retryable(reason) => {
                last_reason = Some(reason);
                if n < max_retries {
                    warn!(attempt = n, max_retries, ?reason, "generation attempt failed, retrying");
                    sleep(reason.delay());
                }
            }
        }
    }
    match last_reason {
        Some(reason) => Err(reason.exhausted(endpoint)),
        None => Err(GenerateError::Api {
            message: "no generation attempts were made (max_retries is 0)".to_string(),
        }),
    }
}

/// Non-streaming request body for `POST /api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response body; only the completion field is consumed.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Production client for a locally hosted Ollama server.
#[derive(Debug)]
pub struct OllamaClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    max_retries: u32,
}

impl OllamaClient {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    fn attempt(&self, prompt: &str) -> Attempt {
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response = match self.http.post(&self.endpoint).json(&payload).send() {
            Ok(response) => response,
            Err(err) => return classify_transport_error(&err),
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_else(|_| "(no body)".to_string());
            return Attempt::Fatal(GenerateError::Api {
                message: format!("status {status}: {body}"),
            });
        }
        match response.json::<GenerateResponse>() {
            Ok(body) => Attempt::Ok(body.response),
            Err(err) => Attempt::Fatal(GenerateError::Api {
                message: format!("invalid response body: {err}"),
            }),
        }
    }
}

// Connect-phase timeouts report both `is_connect` and `is_timeout`; they
// count as unreachable, so the connect check comes first.
fn classify_transport_error(err: &reqwest::Error) -> Attempt {
    if err.is_connect() {
        Attempt::Retryable(RetryReason::Unreachable)
    } else if err.is_timeout() {
        Attempt::Retryable(RetryReason::TimedOut)
    } else {
        Attempt::Fatal(GenerateError::Api {
            message: err.to_string(),
        })
    }
}

impl GenerateClient for OllamaClient {
    #[instrument(skip_all, fields(prompt_bytes = prompt.len(), model = %self.model))]
    fn generate(&self, prompt: &str) -> Result<String, GenerateError> {
        debug!("sending generation request");
        run_with_retry(
            &self.endpoint,
            self.max_retries,
            |_| self.attempt(prompt),
            thread::sleep,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    fn scripted(outcomes: Vec<Attempt>) -> impl FnMut(u32) -> Attempt {
        let mut queue = VecDeque::from(outcomes);
        move |_n: u32| queue.pop_front().expect("scripted attempt available")
    }

    #[test]
    fn retry_bound_is_exact_for_refused_connections() {
        let mut attempts = 0u32;
        let mut sleeps = Vec::new();
        let result = run_with_retry(
            "http://localhost:11434/api/generate",
            3,
            |_| {
                attempts += 1;
                Attempt::Retryable(RetryReason::Unreachable)
            },
            |delay| sleeps.push(delay),
        );

        assert_eq!(attempts, 3);
        assert_eq!(sleeps, vec![CONNECT_RETRY_DELAY, CONNECT_RETRY_DELAY]);
        let err = result.unwrap_err();
        assert!(matches!(err, GenerateError::Unreachable { .. }));
        assert!(err.to_string().contains("running locally"));
    }

    #[test]
    fn one_connection_failure_then_success_sleeps_once() {
        let attempt = scripted(vec![
            Attempt::Retryable(RetryReason::Unreachable),
            Attempt::Ok("text".to_string()),
        ]);
        let mut sleeps = Vec::new();
        let result = run_with_retry("endpoint", 3, attempt, |delay| sleeps.push(delay));

        assert_eq!(result.expect("generation succeeds"), "text");
        assert_eq!(sleeps, vec![CONNECT_RETRY_DELAY]);
    }

    #[test]
    fn timeout_retry_uses_shorter_delay() {
        let attempt = scripted(vec![
            Attempt::Retryable(RetryReason::TimedOut),
            Attempt::Ok("text".to_string()),
        ]);
        let mut sleeps = Vec::new();
        run_with_retry("endpoint", 3, attempt, |delay| sleeps.push(delay))
            .expect("generation succeeds");

        assert_eq!(sleeps, vec![TIMEOUT_RETRY_DELAY]);
    }

    #[test]
    fn exhausted_timeouts_report_timed_out() {
        let mut sleeps = Vec::new();
        let err = run_with_retry(
            "endpoint",
            2,
            |_| Attempt::Retryable(RetryReason::TimedOut),
            |delay| sleeps.push(delay),
        )
        .unwrap_err();

        assert!(matches!(err, GenerateError::TimedOut));
        assert_eq!(sleeps, vec![TIMEOUT_RETRY_DELAY]);
    }

    #[test]
    fn fatal_failure_is_not_retried() {
        let mut attempts = 0u32;
        let mut sleeps = Vec::new();
        let err = run_with_retry(
            "endpoint",
            3,
            |_| {
                attempts += 1;
                Attempt::Fatal(GenerateError::Api {
                    message: "status 500".to_string(),
                })
            },
            |delay| sleeps.push(delay),
        )
        .unwrap_err();

        assert_eq!(attempts, 1);
        assert!(sleeps.is_empty());
        assert!(matches!(err, GenerateError::Api { .. }));
    }

    #[test]
    fn success_on_first_attempt_never_sleeps() {
        let mut sleeps = Vec::new();
        let result = run_with_retry(
            "endpoint",
            3,
            |_| Attempt::Ok("done".to_string()),
            |delay| sleeps.push(delay),
        );

        assert_eq!(result.expect("generation succeeds"), "done");
        assert!(sleeps.is_empty());
    }

    #[test]
    fn request_payload_disables_streaming() {
        let payload = GenerateRequest {
            model: "phi3:mini",
            prompt: "write tests",
            stream: false,
        };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["model"], "phi3:mini");
        assert_eq!(json["prompt"], "write tests");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn response_parsing_keeps_completion_verbatim() {
        let raw = r#"{"model":"phi3:mini","response":"```cpp\nint x;\n```","done":true}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.response, "```cpp\nint x;\n```");
    }

    /// Loopback connections to a closed port are refused immediately, so the
    /// full client maps them to `Unreachable` without burning the timeout.
    #[test]
    fn refused_connection_maps_to_unreachable() {
        let config = PipelineConfig {
            endpoint: "http://127.0.0.1:9/api/generate".to_string(),
            max_retries: 1,
            request_timeout_secs: 2,
            ..PipelineConfig::default()
        };
        let client = OllamaClient::new(&config).expect("client");

        let err = client.generate("hello").unwrap_err();
        assert!(matches!(err, GenerateError::Unreachable { .. }));
    }
}

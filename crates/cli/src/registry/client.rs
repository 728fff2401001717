//! HTTP client with retry, backoff and error classification.
//!
//! Shared by every registry endpoint. Callers pass a request-building
//! closure; the client owns the retry loop and maps status codes onto
//! [`RegistryError`]:
//!
//! | Status            | Handling                         | Error          |
//! |-------------------|----------------------------------|----------------|
//! | 401, 403          | fail immediately                 | `Auth`         |
//! | 400               | fail immediately                 | `Rejected`     |
//! | other 4xx         | fail immediately                 | `Upstream`     |
//! | 429               | retry, honour `Retry-After`      | `RateLimited`  |
//! | 5xx, transport    | retry with doubling backoff      | `Upstream`     |

use std::thread;
use std::time::{Duration, Instant};

use taxalign_recon::config::RegistryConfig;
use taxalign_recon::RegistryError;

// ── Constants ───────────────────────────────────────────────────────

pub(super) const USER_AGENT: &str = concat!("taxalign/", env!("CARGO_PKG_VERSION"));

/// Longest body excerpt quoted in decode errors.
const BODY_EXCERPT: usize = 200;

/// Upper bound on any single wait between attempts, `Retry-After` included.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

// ── RegistryClient ──────────────────────────────────────────────────

pub(super) struct RegistryClient {
    http: reqwest::blocking::Client,
    max_retries: u32,
    backoff: Duration,
    request_timeout: Duration,
}

impl RegistryClient {
    pub(super) fn new(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RegistryError::Upstream(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            request_timeout,
        })
    }

    /// Send a request with retry + exponential backoff and parse the JSON
    /// response.
    ///
    /// `build_request` is called once per attempt and must return a fully
    /// configured `RequestBuilder` (URL, credential, query or body).
    ///
    /// With a `deadline`, no attempt runs past it and no wait is started
    /// that would end after it; the call fails with
    /// [`RegistryError::DeadlineExceeded`] instead.
    pub(super) fn request_with_retry(
        &self,
        deadline: Option<Instant>,
        build_request: impl Fn(&reqwest::blocking::Client) -> reqwest::blocking::RequestBuilder,
    ) -> Result<serde_json::Value, RegistryError> {
        let mut backoff = self.backoff;
        let mut attempt = 0u32;

        loop {
            let mut request = build_request(&self.http);
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(RegistryError::DeadlineExceeded { attempts: attempt });
                }
                request = request.timeout(remaining.min(self.request_timeout));
            }

            let (requested, cause) = match request.send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    // Auth errors: fail immediately
                    if status == 401 || status == 403 {
                        let msg = error_message(resp, status);
                        return Err(RegistryError::Auth(format!("HTTP {status}: {msg}")));
                    }

                    // Bad request: fail immediately
                    if status == 400 {
                        let message = error_message(resp, status);
                        return Err(RegistryError::Rejected { status, message });
                    }

                    // Other 4xx (not 429): fail immediately
                    if (400..500).contains(&status) && status != 429 {
                        let msg = error_message(resp, status);
                        return Err(RegistryError::Upstream(format!("HTTP {status}: {msg}")));
                    }

                    if status != 429 && status < 500 {
                        return parse_body(resp);
                    }

                    // Retryable: 429, 5xx
                    if attempt == self.max_retries {
                        return Err(if status == 429 {
                            RegistryError::RateLimited { attempts: attempt + 1 }
                        } else {
                            RegistryError::Upstream(format!(
                                "HTTP {status} after {} attempts",
                                attempt + 1
                            ))
                        });
                    }

                    let requested = if status == 429 {
                        retry_after(&resp).unwrap_or(backoff)
                    } else {
                        backoff
                    };
                    (requested, format!("HTTP {status}"))
                }
                Err(e) => {
                    // Network/timeout errors: retry
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(RegistryError::DeadlineExceeded { attempts: attempt + 1 });
                    }
                    if attempt == self.max_retries {
                        return Err(RegistryError::Upstream(format!(
                            "{e} (after {} attempts)",
                            attempt + 1
                        )));
                    }
                    (backoff, e.to_string())
                }
            };

            let Some(wait) = next_wait(requested, deadline) else {
                log::warn!("giving up after {} attempts ({cause}): batch deadline reached", attempt + 1);
                return Err(RegistryError::DeadlineExceeded { attempts: attempt + 1 });
            };
            log::warn!(
                "retry {}/{} in {}ms ({cause})",
                attempt + 1,
                self.max_retries,
                wait.as_millis()
            );

            thread::sleep(wait);
            backoff *= 2;
            attempt += 1;
        }
    }
}

fn retry_after(resp: &reqwest::blocking::Response) -> Option<Duration> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Wait before the next attempt, capped at [`MAX_RETRY_WAIT`]. `None` when
/// the wait would end at or after the deadline.
fn next_wait(requested: Duration, deadline: Option<Instant>) -> Option<Duration> {
    let wait = requested.min(MAX_RETRY_WAIT);
    match deadline {
        Some(deadline) if Instant::now() + wait >= deadline => None,
        _ => Some(wait),
    }
}

/// Read the body as text first so BOM-prefixed JSON still parses.
fn parse_body(resp: reqwest::blocking::Response) -> Result<serde_json::Value, RegistryError> {
    let text = resp
        .text()
        .map_err(|e| RegistryError::Upstream(format!("failed to read response body: {e}")))?;
    let trimmed = text.trim_start_matches('\u{feff}');
    serde_json::from_str(trimmed).map_err(|e| {
        let excerpt: String = trimmed.chars().take(BODY_EXCERPT).collect();
        RegistryError::Decode(format!("{e} (body: {excerpt})"))
    })
}

/// Best-effort message from an error response body.
fn error_message(resp: reqwest::blocking::Response, status: u16) -> String {
    let body: serde_json::Value = resp.json().unwrap_or(serde_json::Value::Null);
    extract_registry_error(&body, status)
}

pub(super) fn extract_registry_error(body: &serde_json::Value, status: u16) -> String {
    let candidates = [
        body.get("message"),
        body.get("error").and_then(|e| e.get("message")),
        body.get("error"),
        body.get("detail"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

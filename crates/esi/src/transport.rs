//! Retrying, rate-aware request execution.
//!
//! ESI enforces a rolling error budget: `x-esi-error-limit-remain` requests
//! may fail before the window advertised in `x-esi-error-limit-reset` closes,
//! and crossing the limit earns a temporary IP ban. The transport reads both
//! headers after every attempt and scales its back-off so the delay is near
//! zero while the budget is full and approaches the full reset window as it
//! empties.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use regex::Regex;
use reqwest::{Request, Response};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{EsiError, Result};

/// Process-wide cap on in-flight ESI requests.
const MAX_IN_FLIGHT: usize = 100;

/// Attempts per request before giving up.
const MAX_TRIES: u32 = 5;

fn url_filter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("/v[0-9]/|/[0-9]+/").expect("static regex"))
}

/// Collapse version and numeric path segments so every region, contract, and
/// page shares one metrics label.
fn endpoint_label(path: &str) -> String {
    url_filter().replace_all(path, "/").into_owned()
}

/// Error-budget state advertised by an ESI response.
///
/// Both headers must parse as integers for the server-advised mode; any
/// other response (a proxy error page, a CDN response) falls back to
/// linear-by-attempt back-off.
#[derive(Debug, Clone, Copy, Default)]
struct ErrorBudget {
    reset: Option<i64>,
    remain: Option<i64>,
}

impl ErrorBudget {
    fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let parse = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<i64>().ok())
        };
        Self {
            reset: parse("x-esi-error-limit-reset"),
            remain: parse("x-esi-error-limit-remain"),
        }
    }

    /// Back-off before the next attempt. Server-advised when both headers
    /// parsed, linear in the attempt count otherwise.
    fn backoff(&self, tries: u32) -> Duration {
        match (self.reset, self.remain) {
            (Some(reset), Some(remain)) => {
                let depleted = 1.0 - remain as f64 / 100.0;
                Duration::from_secs_f64((reset as f64 * depleted).max(0.0))
            }
            _ => Duration::from_secs(u64::from(tries)),
        }
    }
}

/// Request executor shared by every worker in the process.
pub struct EsiTransport {
    http: reqwest::Client,
    limiter: Arc<Semaphore>,
    verbose: bool,
}

impl EsiTransport {
    pub fn new(http: reqwest::Client, verbose: bool) -> Self {
        Self {
            http,
            limiter: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            verbose,
        }
    }

    /// Execute a request, retrying server errors up to [`MAX_TRIES`] times.
    ///
    /// 2xx/3xx responses are returned as-is. 4xx responses are terminal and
    /// returned after a single budget-aware back-off. 5xx responses and
    /// transport failures are retried until the attempt cap.
    pub async fn execute(&self, req: Request) -> Result<Response> {
        let host = req.url().host_str().unwrap_or_default().to_string();
        let endpoint = endpoint_label(req.url().path());
        let url = req.url().clone();

        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("transport semaphore is never closed");

        let mut tries: u32 = 0;
        loop {
            tries += 1;
            let attempt = req.try_clone().ok_or(EsiError::UncloneableRequest)?;

            let start = Instant::now();
            let result = self.http.execute(attempt).await;
            let elapsed = start.elapsed();

            match result {
                Ok(res) => {
                    let status = res.status();
                    histogram!(
                        "evemarketwatch_api_calls",
                        "host" => host.clone(),
                        "endpoint" => endpoint.clone(),
                        "status" => status.as_u16().to_string(),
                        "try" => tries.to_string()
                    )
                    .record(elapsed.as_secs_f64() * 1000.0);

                    let budget = ErrorBudget::from_headers(res.headers());

                    if status.as_u16() >= 400 {
                        counter!("evemarketwatch_api_errors").increment(1);
                        warn!(
                            %url,
                            status = status.as_u16(),
                            reset = ?budget.reset,
                            remain = ?budget.remain,
                            tries,
                            "esi request failed"
                        );
                        tokio::time::sleep(budget.backoff(tries)).await;

                        if status.is_client_error() {
                            return Err(EsiError::Status(status));
                        }
                    } else {
                        if self.verbose {
                            info!(
                                %url,
                                status = status.as_u16(),
                                reset = ?budget.reset,
                                remain = ?budget.remain,
                                tries,
                                "esi round trip"
                            );
                        }
                        return Ok(res);
                    }

                    if tries >= MAX_TRIES {
                        return Err(EsiError::Status(status));
                    }
                }
                Err(err) => {
                    warn!(%url, error = %err, tries, "esi transport error");
                    if tries >= MAX_TRIES {
                        return Err(err.into());
                    }
                    tokio::time::sleep(Duration::from_secs(u64::from(tries))).await;
                }
            }
        }
    }
}

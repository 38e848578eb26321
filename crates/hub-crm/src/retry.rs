//! Retry/backoff policy over HTTP status codes (spec §4.1).
//!
//! Grounded in `skynet-agent::openai::OpenAiProvider::send`'s status-code
//! branching into typed errors, and `skynet-channels::manager`'s
//! dependency-free jitter (`SystemTime` nanos instead of a `rand` crate).

use std::time::Duration;

use tracing::warn;

use crate::error::CrmError;

const MAX_503_RETRIES: u32 = 20;
const MAX_429_RETRIES: u32 = 8;
const BASE_DELAY_MS: f64 = 500.0;
const BACKOFF_FACTOR: f64 = 1.5;
const MAX_DELAY_MS: f64 = 15_000.0;
const JITTER_MS: i64 = 200;

fn jittered_backoff_ms(attempt: u32) -> u64 {
    let raw = (BASE_DELAY_MS * BACKOFF_FACTOR.powi(attempt as i32)).min(MAX_DELAY_MS);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as i64;
    let jitter = (nanos % (2 * JITTER_MS + 1)) - JITTER_MS;
    (raw as i64 + jitter).max(0) as u64
}

/// Drives one logical CRM call through the retry policy, calling `send`
/// fresh on every attempt (request bodies for Bitrix calls are cheaply
/// re-buildable form strings, so no body-cloning concerns).
pub async fn run<F, Fut>(mut send: F) -> Result<reqwest::Response, CrmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
{
    let mut attempt_503 = 0u32;
    let mut attempt_429 = 0u32;

    loop {
        let resp = match send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(CrmError::Timeout),
            Err(e) => return Err(CrmError::Connection(e.to_string())),
        };

        let status = resp.status().as_u16();
        match status {
            200..=299 => return Ok(resp),
            503 => {
                attempt_503 += 1;
                if attempt_503 > MAX_503_RETRIES {
                    return Err(CrmError::RateLimitExhausted);
                }
                let delay = jittered_backoff_ms(attempt_503);
                warn!(attempt = attempt_503, delay_ms = delay, "CRM 503, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            429 => {
                attempt_429 += 1;
                if attempt_429 > MAX_429_RETRIES {
                    return Err(CrmError::RateLimitExhausted);
                }
                let delay = retry_after_ms(&resp).unwrap_or_else(|| jittered_backoff_ms(attempt_429));
                warn!(attempt = attempt_429, delay_ms = delay, "CRM 429, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            403 => {
                let body = resp.text().await.unwrap_or_default();
                if body.contains("nginx") {
                    return Err(CrmError::GatewayBlocked);
                }
                return Err(CrmError::Api { status, body });
            }
            500 => {
                let body = resp.text().await.unwrap_or_default();
                if body.trim() == "Internal Server Error" {
                    return Err(CrmError::ServerError);
                }
                return Err(CrmError::Api { status, body });
            }
            401 => {
                let body = resp.text().await.unwrap_or_default();
                if body.contains("expired_token") {
                    return Err(CrmError::ExpiredToken);
                }
                return Err(CrmError::Api { status, body });
            }
            _ => {
                let body = resp.text().await.unwrap_or_default();
                return Err(CrmError::Api { status, body });
            }
        }
    }
}

fn retry_after_ms(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

//! Retry policy for chat-completion requests.
//!
//! Retries 408, 409, 429 and 5xx responses plus connection failures with
//! exponential backoff. A valid `Retry-After` header overrides the backoff.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// Longest server-requested delay that is honoured.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `step` (0-based).
    pub fn delay(&self, step: u32, headers: Option<&HeaderMap>) -> Duration {
        if let Some(delay) = headers.and_then(parse_retry_after) {
            return delay;
        }
        let factor = 2u32.saturating_pow(step);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Whether a response status is worth retrying.
pub fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 429) || status.is_server_error()
}

/// Parse `retry-after-ms` (float milliseconds) or `retry-after` (seconds).
///
/// Values outside `(0, 60s)` are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let in_range = |d: Duration| d > Duration::ZERO && d < MAX_RETRY_AFTER;

    let ms = headers
        .get("retry-after-ms")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms > 0.0)
        .map(|ms| Duration::from_secs_f64(ms / 1000.0))
        .filter(|d| in_range(*d));
    if ms.is_some() {
        return ms;
    }

    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .filter(|d| in_range(*d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retryable_statuses() {
        for code in [408, 409, 429, 500, 502, 503, 504] {
            assert!(should_retry(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [200, 400, 401, 403, 404, 422] {
            assert!(!should_retry(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0, None), Duration::from_millis(500));
        assert_eq!(policy.delay(1, None), Duration::from_secs(1));
        assert_eq!(policy.delay(2, None), Duration::from_secs(2));
        assert_eq!(policy.delay(10, None), Duration::from_secs(8));
    }

    #[test]
    fn retry_after_overrides_backoff() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        assert_eq!(
            RetryPolicy::default().delay(0, Some(&headers)),
            Duration::from_secs(3)
        );

        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(250)));
    }

    #[test]
    fn out_of_range_retry_after_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("600"));
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers), None);
    }
}

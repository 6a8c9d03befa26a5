//! Rate limit headers recorded on failed calls.
//!
//! The engine does not retry or wait; it only copies what the server said about
//! its limits into the [`ErrorContext`] so the log line carries it.

use crate::error::ErrorContext;
use http::header::RETRY_AFTER;
use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Rate limit state advertised by a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// How long the server asked the client to wait (`Retry-After`).
    pub retry_after: Option<Duration>,

    /// When the current window resets (`X-RateLimit-Reset` or `RateLimit-Reset`).
    pub reset_at: Option<SystemTime>,

    /// Requests left in the current window (`X-RateLimit-Remaining` or `RateLimit-Remaining`).
    pub remaining: Option<u64>,
}

impl RateLimitHeaders {
    /// Reads the rate limit headers of a response.
    ///
    /// `Retry-After` may be given as delay-seconds or as an HTTP date; a date in
    /// the past is ignored. Reset headers are Unix timestamps.
    ///
    /// # Examples
    ///
    /// ```
    /// use httpcall::RateLimitHeaders;
    /// use http::HeaderMap;
    /// use std::time::Duration;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    /// headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
    ///
    /// let limits = RateLimitHeaders::from_headers(&headers);
    /// assert_eq!(limits.retry_after, Some(Duration::from_secs(60)));
    /// assert!(limits.is_exhausted());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            retry_after: parse_retry_after(headers),
            reset_at: first_u64(headers, &["x-ratelimit-reset", "ratelimit-reset"])
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            remaining: first_u64(headers, &["x-ratelimit-remaining", "ratelimit-remaining"]),
        }
    }

    /// Returns `true` if none of the headers were present.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Returns `true` if the server asked for a pause or reported no requests left.
    pub fn is_exhausted(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }

    /// Records the present values under `Response.RetryAfter`, `RateLimit.Reset`
    /// and `RateLimit.Remaining`.
    pub fn record(&self, context: &mut ErrorContext) {
        if let Some(retry_after) = self.retry_after {
            context.insert("Response.RetryAfter", format!("{}s", retry_after.as_secs()));
        }
        if let Some(reset_at) = self.reset_at {
            context.insert("RateLimit.Reset", httpdate::fmt_http_date(reset_at));
        }
        if let Some(remaining) = self.remaining {
            context.insert("RateLimit.Remaining", remaining);
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(value).ok()?;
    date.duration_since(SystemTime::now()).ok()
}

fn first_u64(headers: &HeaderMap, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok()?.trim().parse().ok())
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("120"));

        let limits = RateLimitHeaders::from_headers(&headers);
        assert_eq!(limits.retry_after, Some(Duration::from_secs(120)));
        assert!(limits.is_exhausted());
    }

    #[test]
    fn test_retry_after_http_date() {
        let later = SystemTime::now() + Duration::from_secs(90);
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_str(&httpdate::fmt_http_date(later)).unwrap(),
        );

        let delay = parse_retry_after(&headers).unwrap();
        assert!(delay <= Duration::from_secs(90));
        assert!(delay >= Duration::from_secs(88));
    }

    #[test]
    fn test_retry_after_in_the_past_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_draft_headers_are_read() {
        let mut headers = HeaderMap::new();
        headers.insert("ratelimit-reset", HeaderValue::from_static("1700000000"));
        headers.insert("ratelimit-remaining", HeaderValue::from_static("7"));

        let limits = RateLimitHeaders::from_headers(&headers);
        assert_eq!(
            limits.reset_at,
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
        assert_eq!(limits.remaining, Some(7));
        assert!(!limits.is_exhausted());
    }

    #[test]
    fn test_record_into_context() {
        let limits = RateLimitHeaders {
            retry_after: Some(Duration::from_secs(30)),
            reset_at: Some(UNIX_EPOCH + Duration::from_secs(1_445_412_480)),
            remaining: Some(0),
        };

        let mut context = ErrorContext::new();
        limits.record(&mut context);

        assert_eq!(context.get("Response.RetryAfter"), Some("30s"));
        assert_eq!(
            context.get("RateLimit.Reset"),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(context.get("RateLimit.Remaining"), Some("0"));
    }

    #[test]
    fn test_no_headers() {
        let limits = RateLimitHeaders::from_headers(&HeaderMap::new());
        assert!(limits.is_empty());

        let mut context = ErrorContext::new();
        limits.record(&mut context);
        assert!(context.is_empty());
    }
}

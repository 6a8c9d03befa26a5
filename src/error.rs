//! Error types for HTTP calls.
//!
//! Sending a request never returns `Err`: every failure is captured into a
//! [`CallError`] and carried by [`CallResult`](crate::CallResult). A `CallError`
//! pairs the underlying [`Error`] with an [`ErrorContext`] of diagnostic
//! key/value pairs and a backtrace captured where the failure was classified.

use http::StatusCode;
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A boxed error used for handler and header failures whose concrete type varies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The underlying cause of a failed call.
///
/// # Examples
///
/// ```no_run
/// use httpcall::{Error, Request};
///
/// # async fn example() {
/// let result = Request::new("https://api.example.com/users/1")
///     .expect_string()
///     .get()
///     .await;
///
/// if let Some(err) = &result.error {
///     match err.error() {
///         Error::NonSuccessStatus { status, uri, .. } => {
///             eprintln!("{} returned {}", uri, status);
///         }
///         Error::TimedOut { timeout, .. } => eprintln!("gave up after {:?}", timeout),
///         other => eprintln!("call failed: {}", other),
///     }
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The caller's cancellation token was signalled before the call completed.
    #[error("HttpClient request cancelled by token request.")]
    Cancelled,

    /// The call did not complete within the timeout bound to its pooled client.
    #[error("HttpClient request timed out. Timeout: {}", format_millis(.timeout))]
    TimedOut {
        /// The timeout the pooled client was built with
        timeout: Duration,
        /// The transport error reporting the timeout, if there was one
        source: Option<reqwest::Error>,
    },

    /// The server answered with a status outside the 2xx range.
    #[error("Response code was {} ({reason}) from {uri}: {reason}", .status.as_u16())]
    NonSuccessStatus {
        /// The HTTP status code
        status: StatusCode,
        /// The reason phrase for the status
        reason: String,
        /// The URI the request was sent to
        uri: String,
    },

    /// Connection, DNS, TLS, protocol or body-read failure in the transport.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response handler could not decode the body.
    #[error("Failed to decode response (status {status}): {source}")]
    Decode {
        /// The HTTP status code of the decoded response
        status: StatusCode,
        /// The decoder's error
        source: BoxError,
    },

    /// A header name or value was rejected while building the request.
    #[error("Unable to set header: {name} to '{value}'")]
    InvalidHeaderValue {
        /// The header name as supplied
        name: String,
        /// The header value as supplied
        value: String,
        /// Why the header was rejected
        source: BoxError,
    },

    /// The request URI could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request body could not be serialized.
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// A pooled transport client could not be constructed.
    #[error("Failed to build HTTP client: {source}")]
    ClientBuild {
        /// The builder error from the transport
        source: reqwest::Error,
    },
}

/// The classification of an [`Error`], for branching without matching on fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Cancelled`].
    Cancelled,
    /// See [`Error::TimedOut`].
    TimedOut,
    /// See [`Error::NonSuccessStatus`].
    NonSuccessStatus,
    /// See [`Error::Transport`].
    TransportFailure,
    /// See [`Error::Decode`].
    HandlerDecodeFailure,
    /// See [`Error::InvalidHeaderValue`].
    InvalidHeaderValue,
    /// The request could not be formed: bad URI, body, or client configuration.
    InvalidRequest,
}

impl Error {
    /// Wraps a handler's decode failure.
    pub fn decode(status: StatusCode, source: impl Into<BoxError>) -> Self {
        Error::Decode {
            status,
            source: source.into(),
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Cancelled => ErrorKind::Cancelled,
            Error::TimedOut { .. } => ErrorKind::TimedOut,
            Error::NonSuccessStatus { .. } => ErrorKind::NonSuccessStatus,
            Error::Transport(_) => ErrorKind::TransportFailure,
            Error::Decode { .. } => ErrorKind::HandlerDecodeFailure,
            Error::InvalidHeaderValue { .. } => ErrorKind::InvalidHeaderValue,
            Error::InvalidUrl(_) | Error::Serialization(_) | Error::ClientBuild { .. } => {
                ErrorKind::InvalidRequest
            }
        }
    }

    /// Returns the HTTP status code if this error has one.
    ///
    /// Returns `Some(status)` for `NonSuccessStatus` and `Decode` errors,
    /// `None` for other error types.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::NonSuccessStatus { status, .. } => Some(*status),
            Error::Decode { status, .. } => Some(*status),
            Error::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for the few operations that fail synchronously.
pub type Result<T> = std::result::Result<T, Error>;

/// Ordered key/value diagnostics attached to a [`CallError`].
///
/// Keys are stored unprefixed (`Request.URI`, `Response.Code`, ...); log sinks
/// that need the configured prefix use [`ErrorContext::prefixed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    entries: BTreeMap<String, String>,
}

impl ErrorContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        self.entries.insert(key.into(), value.to_string());
        self
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns `true` if an entry exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over the entries with `prefix` prepended to every key.
    pub fn prefixed<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (String, &'a str)> + 'a {
        self.entries
            .iter()
            .map(move |(k, v)| (format!("{}{}", prefix, k), v.as_str()))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A captured call failure: the [`Error`], its diagnostics, and where it was raised.
#[derive(Debug)]
pub struct CallError {
    error: Error,
    context: ErrorContext,
    backtrace: Backtrace,
}

impl CallError {
    /// Captures `error` with an empty context.
    pub fn new(error: Error) -> Self {
        Self {
            error,
            context: ErrorContext::new(),
            backtrace: Backtrace::capture(),
        }
    }

    /// Returns the underlying error.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Consumes this failure, returning the underlying error.
    pub fn into_error(self) -> Error {
        self.error
    }

    /// Returns the classification of the underlying error.
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    /// Returns the diagnostic key/value pairs gathered for this failure.
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut ErrorContext {
        &mut self.context
    }

    /// Returns the backtrace captured when the failure was classified.
    ///
    /// Only populated when `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` is set.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns the HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.error.status()
    }

    /// Returns `true` if the call was cancelled by its token.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns `true` if the call exceeded its timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::TimedOut
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

impl From<Error> for CallError {
    fn from(error: Error) -> Self {
        CallError::new(error)
    }
}

/// Renders a duration rounded to the nearest millisecond with grouped
/// thousands, e.g. `1,000ms`.
pub(crate) fn format_millis(timeout: &Duration) -> String {
    let millis = (timeout.as_micros() + 500) / 1_000;
    let digits = millis.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push_str("ms");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis_groups_thousands() {
        assert_eq!(format_millis(&Duration::from_millis(0)), "0ms");
        assert_eq!(format_millis(&Duration::from_millis(999)), "999ms");
        assert_eq!(format_millis(&Duration::from_secs(1)), "1,000ms");
        assert_eq!(format_millis(&Duration::from_secs(30)), "30,000ms");
        assert_eq!(format_millis(&Duration::from_millis(1_234_567)), "1,234,567ms");
    }

    #[test]
    fn test_format_millis_rounds_to_nearest() {
        assert_eq!(format_millis(&Duration::from_micros(1_500)), "2ms");
        assert_eq!(format_millis(&Duration::from_micros(1_499)), "1ms");
        assert_eq!(format_millis(&Duration::from_micros(999_600)), "1,000ms");
    }

    #[test]
    fn test_timed_out_message() {
        let err = Error::TimedOut {
            timeout: Duration::from_secs(1),
            source: None,
        };
        let message = err.to_string();
        assert!(message.contains("timed out"));
        assert!(message.contains("1,000ms"));
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn test_non_success_status_message() {
        let err = Error::NonSuccessStatus {
            status: StatusCode::NOT_FOUND,
            reason: "Not Found".to_string(),
            uri: "http://localhost/missing".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Response code was 404 (Not Found) from http://localhost/missing: Not Found"
        );
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_error_context_prefixed() {
        let mut ctx = ErrorContext::new();
        ctx.insert("Response.Code", 404).insert("Request.URI", "http://a/");

        assert_eq!(ctx.get("Response.Code"), Some("404"));
        let keys: Vec<String> = ctx.prefixed("Custom-").map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Custom-Request.URI", "Custom-Response.Code"]);
    }

    #[test]
    fn test_call_error_kind_helpers() {
        let err = CallError::new(Error::Cancelled);
        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "HttpClient request cancelled by token request.");
    }
}

//! The uniform result of a call.
//!
//! Every send produces exactly one [`CallResult`], whether the call succeeded,
//! the server answered with an error status, or the request never completed.
//! Callers branch on [`CallResult::success`], [`CallResult::error`] and
//! [`CallResult::status_code`].

use crate::error::CallError;
use crate::metadata::RequestMetadata;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode, Version};
use std::time::Duration;
use url::Url;

/// The request as it was sent.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// The HTTP method
    pub method: Method,
    /// The target URI
    pub uri: String,
    /// The request-level headers (pooled client defaults are not included)
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub(crate) fn from_metadata(metadata: &RequestMetadata) -> Self {
        Self {
            method: metadata.method.clone(),
            uri: metadata.uri.clone(),
            headers: metadata.headers.clone(),
        }
    }
}

/// The status line and headers of a received response.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// The HTTP status code
    pub status: StatusCode,
    /// The HTTP version of the response
    pub version: Version,
    /// The response headers
    pub headers: HeaderMap,
    /// The final URL of the response
    pub url: Url,
}

impl ResponseInfo {
    pub(crate) fn from_reqwest(response: &reqwest::Response) -> Self {
        Self {
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
            url: response.url().clone(),
        }
    }

    /// The reason phrase for the status, or an empty string for unknown codes.
    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// The `Content-Type` header, if present and valid.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// The outcome of a call.
///
/// `success` is `true` only when a response arrived with a 2xx status and the
/// handler decoded it; `data` is then populated and `error` is `None`. In every
/// other case `error` is populated. A status the request chose to ignore still
/// has `success == false`, but its body is decoded into `data`.
///
/// # Examples
///
/// ```no_run
/// use httpcall::Request;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, Default)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() {
/// let result = Request::new("https://api.example.com/users/123")
///     .expect_json::<User>()
///     .get()
///     .await;
///
/// if result.success {
///     let user = result.data.unwrap();
///     println!("User: {}", user.name);
/// } else if let Some(error) = &result.error {
///     println!("Call failed ({:?}): {}", result.status_code(), error);
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct CallResult<T> {
    /// Whether the call produced a 2xx response that decoded cleanly.
    pub success: bool,

    /// The decoded payload.
    ///
    /// Present on success, and also when the status was in the request's
    /// ignored set and the handler decoded the body; `success` is still
    /// `false` in that case.
    pub data: Option<T>,

    /// The failure, if the call did not succeed.
    pub error: Option<CallError>,

    /// The request that was sent.
    pub request: RequestInfo,

    /// The response, if one was received.
    pub response: Option<ResponseInfo>,

    /// Time from issuing the request until the result was built.
    pub latency: Duration,
}

impl<T> CallResult<T> {
    /// The HTTP status code, if a response was received.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|r| r.status)
    }

    /// The URI the request was sent to.
    pub fn request_uri(&self) -> &str {
        &self.request.uri
    }

    /// Returns a response header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.as_ref()?.header(name)
    }

    /// Maps the payload to a different type, keeping everything else.
    ///
    /// # Examples
    ///
    /// ```
    /// # use httpcall::{CallResult, RequestInfo};
    /// # use http::{HeaderMap, Method};
    /// # use std::time::Duration;
    /// let result = CallResult {
    ///     success: true,
    ///     data: Some(42),
    ///     error: None,
    ///     request: RequestInfo {
    ///         method: Method::GET,
    ///         uri: "http://localhost/".to_string(),
    ///         headers: HeaderMap::new(),
    ///     },
    ///     response: None,
    ///     latency: Duration::from_millis(5),
    /// };
    ///
    /// let mapped = result.map(|n| n.to_string());
    /// assert_eq!(mapped.data.as_deref(), Some("42"));
    /// ```
    pub fn map<U, F>(self, f: F) -> CallResult<U>
    where
        F: FnOnce(T) -> U,
    {
        CallResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            request: self.request,
            response: self.response,
            latency: self.latency,
        }
    }
}

//! Fluent request builders.
//!
//! [`Request`] accumulates options for one call. Binding a response handler
//! turns it into a [`TypedRequest<T>`], which is the only type that can send;
//! it has no way to bind a second handler.

use crate::cancel::CancellationToken;
use crate::client;
use crate::error::{CallError, Error, Result};
use crate::handler::{self, Handler, HttpResponse};
use crate::metadata::{RequestBody, RequestMetadata};
use crate::pool::ClientPool;
use crate::proxy::ProxySettings;
use crate::response::CallResult;
use crate::settings::{ExceptionArgs, Settings};
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::FutureExt;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// An HTTP request under construction.
///
/// Every setter consumes and returns the builder. Nothing is validated or sent
/// until a handler is bound and a verb is called.
///
/// # Examples
///
/// ```no_run
/// use httpcall::Request;
/// use std::time::Duration;
///
/// # async fn example() {
/// let result = Request::new("https://api.example.com/health")
///     .header("X-Request-Id", "abc-123")
///     .timeout(Duration::from_secs(5))
///     .expect_http_success()
///     .get()
///     .await;
///
/// println!("healthy: {}", result.data.unwrap_or(false));
/// # }
/// ```
#[derive(Clone)]
pub struct Request {
    metadata: RequestMetadata,
}

impl Request {
    /// Starts a request to `uri` that resolves the current default settings at send time.
    #[track_caller]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            metadata: RequestMetadata::new(uri),
        }
    }

    /// Starts a request to `uri` that uses `settings` instead of the current default.
    #[track_caller]
    pub fn with_settings(uri: impl Into<String>, settings: Arc<Settings>) -> Self {
        let mut metadata = RequestMetadata::new(uri);
        metadata.settings = Some(settings);
        Self { metadata }
    }

    /// Names the calling function in error context.
    pub fn caller_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.metadata.caller.name = Some(name.into());
        self
    }

    /// Adds a header.
    ///
    /// The value must be visible ASCII. An invalid name or value is not added;
    /// instead the failure is reported through the exception hooks and the
    /// builder is returned unchanged.
    pub fn header(self, name: &str, value: &str) -> Self {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .map_err(crate::BoxError::from)
            .and_then(|n| Ok((n, HeaderValue::from_str(value)?)));

        match parsed {
            Ok((name, value)) => self.append(name, value),
            Err(source) => self.reject_header(name, value, source),
        }
    }

    /// Adds a header, accepting any value bytes HTTP can carry.
    ///
    /// Unlike [`header`](Self::header), non-ASCII value bytes are kept. A header
    /// that still cannot be represented is reported through the exception hooks
    /// the same way.
    pub fn header_without_validation(self, name: &str, value: &str) -> Self {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .map_err(crate::BoxError::from)
            .and_then(|n| Ok((n, HeaderValue::from_bytes(value.as_bytes())?)));

        match parsed {
            Ok((name, value)) => self.append(name, value),
            Err(source) => self.reject_header(name, value, source),
        }
    }

    /// Adds every header in `headers`.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut last = None;
        for (name, value) in headers {
            // Continuation values of a name arrive with `None`.
            if let Some(name) = name {
                last = Some(name);
            }
            if let Some(name) = &last {
                self.metadata.headers.append(name.clone(), value);
            }
        }
        self
    }

    /// Sets the request timeout.
    ///
    /// Requests with different timeouts never share a pooled client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.metadata.timeout = Some(timeout);
        self
    }

    /// Sets the proxy. Overrides the settings' default proxy factory.
    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.metadata.proxy = Some(proxy);
        self
    }

    /// Draws the client from `pool` instead of the settings' pool.
    pub fn client_pool(mut self, pool: Arc<dyn ClientPool>) -> Self {
        self.metadata.client_pool = Some(pool);
        self
    }

    /// Requests a specific HTTP version.
    pub fn protocol_version(mut self, version: Version) -> Self {
        self.metadata.version = Some(version);
        self
    }

    /// Hands the response to the handler as soon as headers arrive.
    ///
    /// The handler then reads the body from the connection. The built-in JSON
    /// and protobuf handlers still collect the whole body before decoding; use
    /// [`with_handler`](Self::with_handler) and [`HttpResponse::chunk`] to
    /// process it incrementally.
    pub fn without_response_buffering(mut self) -> Self {
        self.metadata.buffer_response = false;
        self
    }

    /// Keeps failures of this request away from logging and exception hooks.
    pub fn without_error_logging(mut self) -> Self {
        self.metadata.log_errors = false;
        self
    }

    /// Decodes responses with `status` instead of failing them, and does not log them.
    ///
    /// The result still reports `success == false` with the status error populated.
    pub fn ignore_status(mut self, status: StatusCode) -> Self {
        self.metadata.ignored_statuses.insert(status);
        self
    }

    /// Ignores each of `statuses`; see [`ignore_status`](Self::ignore_status).
    pub fn ignore_statuses(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.metadata.ignored_statuses.extend(statuses);
        self
    }

    /// Records the body text of failed responses with these statuses as `Response.Body`.
    pub fn log_error_response_body(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.metadata.error_body_statuses.extend(statuses);
        self
    }

    /// Appends a hook that sees this request's failures before they are logged.
    ///
    /// Setting [`ExceptionArgs::abort_logging`] skips the log line and the
    /// settings' exception hooks.
    pub fn on_exception<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ExceptionArgs<'_>) + Send + Sync + 'static,
    {
        self.metadata.before_log.push(Arc::new(hook));
        self
    }

    /// Sends `content` with the given `Content-Type`.
    pub fn send_content(mut self, content: impl Into<Bytes>, content_type: HeaderValue) -> Self {
        self.metadata.body = Some(RequestBody::new(content, content_type));
        self
    }

    /// Sends `pairs` as an `application/x-www-form-urlencoded` body.
    pub fn send_form<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.send_content(encoded, HeaderValue::from_static(FORM_URLENCODED))
    }

    /// Sends an HTML body.
    pub fn send_html(self, html: impl Into<String>) -> Self {
        self.send_content(
            html.into(),
            HeaderValue::from_static("text/html; charset=utf-8"),
        )
    }

    /// Sends a text body, labelled as form data.
    pub fn send_plaintext(self, text: impl Into<String>) -> Self {
        self.send_content(text.into(), HeaderValue::from_static(FORM_URLENCODED))
    }

    /// Sends `body` serialized as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if `body` cannot be serialized.
    pub fn send_json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self> {
        let content = serde_json::to_vec(body).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self.send_content(content, HeaderValue::from_static("application/json")))
    }

    /// Sends `message` protobuf-encoded and gzip-compressed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if compression fails.
    pub fn send_protobuf<M: prost::Message>(mut self, message: &M) -> Result<Self> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&message.encode_to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let content = encoder
            .finish()
            .map_err(|e| Error::Serialization(e.to_string()))?;

        self.metadata.body = Some(RequestBody {
            content: content.into(),
            content_type: HeaderValue::from_static("application/x-protobuf"),
            content_encoding: Some(HeaderValue::from_static("gzip")),
        });
        Ok(self)
    }

    /// The options accumulated so far.
    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    /// Binds a response handler.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use httpcall::Request;
    ///
    /// # async fn example() {
    /// let result = Request::new("https://api.example.com/items")
    ///     .with_handler(|response| async move {
    ///         let len = response.bytes().await?.len();
    ///         Ok::<_, httpcall::Error>(len)
    ///     })
    ///     .get()
    ///     .await;
    /// # }
    /// ```
    pub fn with_handler<T, F, Fut>(self, handler: F) -> TypedRequest<T>
    where
        F: Fn(HttpResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.bind(Arc::new(move |response| handler(response).boxed()))
    }

    /// Binds a handler that yields whether the status was 2xx, leaving the body unread.
    pub fn expect_http_success(self) -> TypedRequest<bool> {
        self.bind(handler::http_success())
    }

    /// Binds a handler that yields the body as text.
    pub fn expect_string(self) -> TypedRequest<String> {
        self.bind(handler::string())
    }

    /// Binds a handler that yields the raw body.
    pub fn expect_bytes(self) -> TypedRequest<Bytes> {
        self.bind(handler::bytes())
    }

    /// Binds a JSON handler. An empty body decodes to `T::default()`.
    pub fn expect_json<T>(self) -> TypedRequest<T>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        self.bind(handler::json())
    }

    /// Binds a protobuf handler.
    pub fn expect_protobuf<M>(self) -> TypedRequest<M>
    where
        M: prost::Message + Default + Send + 'static,
    {
        self.bind(handler::protobuf())
    }

    fn bind<T>(self, handler: Handler<T>) -> TypedRequest<T> {
        TypedRequest {
            request: self,
            handler,
            cancellation: None,
        }
    }

    fn append(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.metadata.headers.append(name, value);
        self
    }

    fn reject_header(self, name: &str, value: &str, source: crate::BoxError) -> Self {
        let mut error = CallError::new(Error::InvalidHeaderValue {
            name: name.to_string(),
            value: value.to_string(),
            source,
        });

        let context = error.context_mut();
        client::record_caller(context, &self.metadata);
        context.insert("Request.URI", &self.metadata.uri);

        let settings = self.metadata.resolved_settings();
        client::dispatch(&self.metadata, &settings, &error);
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// A request with a bound response handler.
///
/// The verbs borrow the request, so one `TypedRequest` can be sent any number
/// of times and with different methods. The returned futures are `'static`
/// and can be spawned.
pub struct TypedRequest<T> {
    request: Request,
    handler: Handler<T>,
    cancellation: Option<CancellationToken>,
}

impl<T> Clone for TypedRequest<T> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            handler: Arc::clone(&self.handler),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<T> fmt::Debug for TypedRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedRequest")
            .field("request", &self.request)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> TypedRequest<T>
where
    T: Send + 'static,
{
    /// Cancels every send of this request once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The accumulated request options.
    pub fn inner(&self) -> &RequestMetadata {
        self.request.metadata()
    }

    /// Sends a GET request.
    pub fn get(&self) -> impl Future<Output = CallResult<T>> + Send + 'static {
        self.send(Method::GET)
    }

    /// Sends a POST request.
    pub fn post(&self) -> impl Future<Output = CallResult<T>> + Send + 'static {
        self.send(Method::POST)
    }

    /// Sends a PUT request.
    pub fn put(&self) -> impl Future<Output = CallResult<T>> + Send + 'static {
        self.send(Method::PUT)
    }

    /// Sends a PATCH request.
    pub fn patch(&self) -> impl Future<Output = CallResult<T>> + Send + 'static {
        self.send(Method::PATCH)
    }

    /// Sends a DELETE request.
    pub fn delete(&self) -> impl Future<Output = CallResult<T>> + Send + 'static {
        self.send(Method::DELETE)
    }

    /// Sends the request with `method`.
    ///
    /// Never fails: transport errors, error statuses, timeouts, cancellation and
    /// decode failures all come back in [`CallResult::error`].
    pub fn send(&self, method: Method) -> impl Future<Output = CallResult<T>> + Send + 'static {
        client::send(
            self.request.metadata.clone(),
            Arc::clone(&self.handler),
            method,
            self.cancellation.clone(),
        )
    }

    /// Sends the request with `method`, cancelled by `token` instead of any
    /// token bound with [`with_cancellation`](Self::with_cancellation).
    pub fn send_with_cancel(
        &self,
        method: Method,
        token: &CancellationToken,
    ) -> impl Future<Output = CallResult<T>> + Send + 'static {
        client::send(
            self.request.metadata.clone(),
            Arc::clone(&self.handler),
            method,
            Some(token.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {
        #[prost(string, tag = "1")]
        name: String,
        #[prost(uint32, tag = "2")]
        count: u32,
    }

    #[test]
    fn test_setters_accumulate() {
        let request = Request::new("http://example.com/items")
            .header("X-Trace", "abc")
            .timeout(Duration::from_secs(9))
            .protocol_version(Version::HTTP_11)
            .without_response_buffering()
            .without_error_logging()
            .ignore_status(StatusCode::NOT_FOUND)
            .ignore_statuses([StatusCode::CONFLICT, StatusCode::GONE])
            .log_error_response_body([StatusCode::BAD_REQUEST])
            .caller_name("list_items");

        let m = request.metadata();
        assert_eq!(m.headers["x-trace"], "abc");
        assert_eq!(m.timeout, Some(Duration::from_secs(9)));
        assert_eq!(m.version, Some(Version::HTTP_11));
        assert!(!m.buffer_response);
        assert!(!m.log_errors);
        assert_eq!(m.ignored_statuses.len(), 3);
        assert!(m.error_body_statuses.contains(&StatusCode::BAD_REQUEST));
        assert_eq!(m.caller().name.as_deref(), Some("list_items"));
        assert!(m.caller().file.ends_with("builder.rs"));
    }

    #[test]
    fn test_invalid_header_is_reported_and_skipped() {
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reported);
        let settings = Arc::new(
            Settings::builder()
                .on_exception(move |args| {
                    assert_eq!(args.error.kind(), crate::ErrorKind::InvalidHeaderValue);
                    assert_eq!(args.error.context().get("Request.URI"), Some("http://example.com"));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        );

        let request = Request::with_settings("http://example.com", settings)
            .header("X-Good", "yes")
            .header("X-Bad", "line\nbreak")
            .header("bad name", "value");

        assert_eq!(reported.load(Ordering::SeqCst), 2);
        assert_eq!(request.metadata().headers.len(), 1);
    }

    #[test]
    fn test_header_without_validation_reports_unrepresentable() {
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reported);
        let settings = Arc::new(
            Settings::builder()
                .on_exception(move |args| {
                    assert_eq!(args.error.kind(), crate::ErrorKind::InvalidHeaderValue);
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .build(),
        );

        let request = Request::with_settings("http://example.com", settings)
            .header_without_validation("X-Name", "caf\u{e9}")
            .header_without_validation("X-Broken", "a\nb")
            .header_without_validation("bad name", "v");

        assert!(request.metadata().headers.contains_key("x-name"));
        assert!(!request.metadata().headers.contains_key("x-broken"));
        assert_eq!(request.metadata().headers.len(), 1);
        assert_eq!(reported.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_bulk_headers_keep_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("accept", HeaderValue::from_static("text/plain"));
        headers.append("accept", HeaderValue::from_static("application/json"));

        let request = Request::new("http://example.com").headers(headers);
        let values: Vec<_> = request.metadata().headers.get_all("accept").iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_form_body() {
        let request = Request::new("http://example.com").send_form([("q", "a b"), ("page", "2")]);
        let body = request.metadata().body.as_ref().unwrap();

        assert_eq!(body.content, Bytes::from_static(b"q=a+b&page=2"));
        assert_eq!(body.content_type, FORM_URLENCODED);
    }

    #[test]
    fn test_json_body() {
        let request = Request::new("http://example.com")
            .send_json(&serde_json::json!({"name": "widget"}))
            .unwrap();
        let body = request.metadata().body.as_ref().unwrap();

        assert_eq!(body.content, Bytes::from_static(br#"{"name":"widget"}"#));
        assert_eq!(body.content_type, "application/json");
        assert!(body.content_encoding.is_none());
    }

    #[test]
    fn test_protobuf_body_is_gzipped() {
        let message = Ping {
            name: "edge".to_string(),
            count: 3,
        };
        let request = Request::new("http://example.com")
            .send_protobuf(&message)
            .unwrap();
        let body = request.metadata().body.as_ref().unwrap();
        assert_eq!(body.content_encoding.as_ref().unwrap(), "gzip");

        let mut decoded = Vec::new();
        GzDecoder::new(&body.content[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(<Ping as prost::Message>::decode(&decoded[..]).unwrap(), message);
    }

    #[test]
    fn test_typed_request_exposes_inner() {
        let typed = Request::new("http://example.com/a")
            .timeout(Duration::from_secs(2))
            .expect_string();

        assert_eq!(typed.inner().uri, "http://example.com/a");
        assert_eq!(typed.clone().inner().timeout, Some(Duration::from_secs(2)));
    }
}

//! Request metadata accumulated by the builder.

use crate::pool::ClientPool;
use crate::proxy::ProxySettings;
use crate::settings::{BeforeLogHook, Settings};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, Version};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

/// Where a request was created, recorded for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerSite {
    /// The calling function, when the caller supplied one
    pub name: Option<Cow<'static, str>>,
    /// The source file of the call
    pub file: &'static str,
    /// The source line of the call
    pub line: u32,
    /// The source column of the call
    pub column: u32,
}

impl CallerSite {
    /// Captures the location of the caller.
    #[track_caller]
    pub fn capture() -> Self {
        let location = Location::caller();
        Self {
            name: None,
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

/// A request body and its content headers.
#[derive(Debug, Clone)]
pub struct RequestBody {
    /// The encoded body
    pub content: Bytes,
    /// The `Content-Type` sent with the body
    pub content_type: HeaderValue,
    /// The `Content-Encoding` sent with the body, if it is compressed
    pub content_encoding: Option<HeaderValue>,
}

impl RequestBody {
    /// Creates an uncompressed body.
    pub fn new(content: impl Into<Bytes>, content_type: HeaderValue) -> Self {
        Self {
            content: content.into(),
            content_type,
            content_encoding: None,
        }
    }
}

/// Everything needed to send one HTTP request.
///
/// Built through [`Request`](crate::Request) and consumed by a send. Before-send
/// hooks receive it mutably, so the plain fields are public.
#[derive(Clone)]
pub struct RequestMetadata {
    /// The target URI, parsed when the request is sent.
    pub uri: String,

    /// The HTTP method. Bound by the verb that sends the request.
    pub method: Method,

    /// Headers for this request.
    pub headers: HeaderMap,

    /// The request body, if any.
    pub body: Option<RequestBody>,

    /// The HTTP version to request, or `None` to negotiate.
    pub version: Option<Version>,

    /// The timeout, or `None` for the settings' default.
    pub timeout: Option<Duration>,

    /// The proxy, or `None` for the settings' default proxy factory.
    pub proxy: Option<ProxySettings>,

    /// Whether the full body is read before the response is handed to the handler.
    pub buffer_response: bool,

    /// Non-success statuses that are neither logged nor handed to exception hooks.
    pub ignored_statuses: HashSet<StatusCode>,

    /// Non-success statuses whose body text is recorded as `Response.Body`.
    pub error_body_statuses: HashSet<StatusCode>,

    /// Whether failures are dispatched to the logging hooks.
    pub log_errors: bool,

    pub(crate) before_log: Vec<BeforeLogHook>,
    pub(crate) client_pool: Option<Arc<dyn ClientPool>>,
    pub(crate) settings: Option<Arc<Settings>>,
    pub(crate) caller: CallerSite,
}

impl RequestMetadata {
    /// Creates metadata for `uri` with default options.
    #[track_caller]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            version: None,
            timeout: None,
            proxy: None,
            buffer_response: true,
            ignored_statuses: HashSet::new(),
            error_body_statuses: HashSet::new(),
            log_errors: true,
            before_log: Vec::new(),
            client_pool: None,
            settings: None,
            caller: CallerSite::capture(),
        }
    }

    /// Returns the timeout the request will be sent with.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(crate::settings::DEFAULT_TIMEOUT)
    }

    /// Returns `true` if `status` is exempt from error logging.
    pub fn is_ignored(&self, status: StatusCode) -> bool {
        self.ignored_statuses.contains(&status)
    }

    /// Returns where the request was created.
    pub fn caller(&self) -> &CallerSite {
        &self.caller
    }

    /// Returns the settings override for this request, if any.
    pub fn settings(&self) -> Option<&Arc<Settings>> {
        self.settings.as_ref()
    }

    /// Returns the client pool override for this request, if any.
    pub fn client_pool(&self) -> Option<&Arc<dyn ClientPool>> {
        self.client_pool.as_ref()
    }

    /// Returns the settings this request resolves to.
    pub fn resolved_settings(&self) -> Arc<Settings> {
        self.settings.clone().unwrap_or_else(Settings::current)
    }

    /// Fills the timeout and proxy from `settings` where the request left them unset.
    pub(crate) fn resolve_defaults(&mut self, settings: &Settings) {
        if self.timeout.is_none() {
            self.timeout = Some(settings.default_timeout());
        }
        if self.proxy.is_none() {
            self.proxy = settings.default_proxy();
        }
    }
}

impl fmt::Debug for RequestMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMetadata")
            .field("uri", &self.uri)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("version", &self.version)
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy)
            .field("buffer_response", &self.buffer_response)
            .field("ignored_statuses", &self.ignored_statuses)
            .field("log_errors", &self.log_errors)
            .field("before_log", &self.before_log.len())
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let metadata = RequestMetadata::new("http://example.com");

        assert_eq!(metadata.method, Method::GET);
        assert!(metadata.buffer_response);
        assert!(metadata.log_errors);
        assert!(metadata.ignored_statuses.is_empty());
        assert_eq!(metadata.effective_timeout(), Duration::from_secs(3));
        assert!(metadata.caller().file.ends_with("metadata.rs"));
    }

    #[test]
    fn test_resolve_defaults_keeps_explicit_values() {
        let settings = Settings::builder()
            .default_timeout(Duration::from_secs(10))
            .default_proxy_factory(ProxySettings::system)
            .build();

        let mut unset = RequestMetadata::new("http://example.com");
        unset.resolve_defaults(&settings);
        assert_eq!(unset.timeout, Some(Duration::from_secs(10)));
        assert_eq!(unset.proxy, Some(ProxySettings::system()));

        let mut explicit = RequestMetadata::new("http://example.com");
        explicit.timeout = Some(Duration::from_secs(1));
        explicit.proxy = Some(ProxySettings::disabled());
        explicit.resolve_defaults(&settings);
        assert_eq!(explicit.timeout, Some(Duration::from_secs(1)));
        assert_eq!(explicit.proxy, Some(ProxySettings::disabled()));
    }
}

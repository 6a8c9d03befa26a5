//! Process-wide defaults and hooks.
//!
//! Every request resolves a [`Settings`]: its own override if one was given,
//! otherwise the current default returned by [`Settings::current`]. Settings are
//! immutable once built; hooks are registered on the [`SettingsBuilder`] and run
//! in registration order.

use crate::error::CallError;
use crate::metadata::RequestMetadata;
use crate::pool::{ClientOptions, ClientPool, DefaultClientPool};
use crate::proxy::ProxySettings;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

/// The timeout used when neither the request nor the settings set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// The default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = "httpcall HttpClient";

/// The default prefix for error context keys handed to log sinks.
pub const DEFAULT_ERROR_DATA_PREFIX: &str = "HttpCall-";

/// Runs before a request is sent and may modify it.
pub type BeforeSendHook = Arc<dyn Fn(&mut RequestMetadata) + Send + Sync>;

/// Receives every failure that is logged.
pub type ExceptionHook = Arc<dyn Fn(&ExceptionArgs<'_>) + Send + Sync>;

/// Runs on a single request's failure before it is logged; may abort the logging.
pub type BeforeLogHook = Arc<dyn Fn(&mut ExceptionArgs<'_>) + Send + Sync>;

/// Produces the proxy for requests that do not set one.
pub type ProxyFactory = Arc<dyn Fn() -> ProxySettings + Send + Sync>;

static CURRENT: LazyLock<RwLock<Arc<Settings>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Settings::default())));

/// A failure on its way to the exception hooks.
pub struct ExceptionArgs<'a> {
    /// The request that failed
    pub request: &'a RequestMetadata,
    /// The enriched failure
    pub error: &'a CallError,
    /// Set by a request's `on_exception` hook to skip the global exception hooks
    pub abort_logging: bool,
}

impl<'a> ExceptionArgs<'a> {
    pub(crate) fn new(request: &'a RequestMetadata, error: &'a CallError) -> Self {
        Self {
            request,
            error,
            abort_logging: false,
        }
    }
}

/// Defaults and hooks shared by requests.
///
/// # Examples
///
/// ```
/// use httpcall::Settings;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let errors = Arc::new(AtomicUsize::new(0));
/// let counter = errors.clone();
///
/// let settings = Settings::builder()
///     .user_agent("my-service/1.0")
///     .default_timeout(Duration::from_secs(10))
///     .on_exception(move |_args| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })
///     .build();
///
/// assert_eq!(settings.user_agent(), "my-service/1.0");
/// ```
pub struct Settings {
    user_agent: String,
    error_data_prefix: String,
    default_timeout: Duration,
    default_proxy_factory: Option<ProxyFactory>,
    accept_invalid_certs: bool,
    client_pool: Arc<dyn ClientPool>,
    before_send: Vec<BeforeSendHook>,
    exception: Vec<ExceptionHook>,
}

impl Settings {
    /// Creates a new `SettingsBuilder`.
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Returns the current process-wide default settings.
    pub fn current() -> Arc<Settings> {
        let current = CURRENT.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }

    /// Replaces the process-wide default, returning the previous one.
    pub fn set_current(settings: Arc<Settings>) -> Arc<Settings> {
        let mut current = CURRENT.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *current, settings)
    }

    /// Replaces the process-wide default until the returned guard is dropped.
    pub fn scoped(settings: Arc<Settings>) -> CurrentSettingsGuard {
        CurrentSettingsGuard {
            previous: Some(Self::set_current(settings)),
        }
    }

    /// The `User-Agent` header sent by pooled clients.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// The prefix for error context keys handed to log sinks.
    pub fn error_data_prefix(&self) -> &str {
        &self.error_data_prefix
    }

    /// The timeout for requests that do not set one.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Whether pooled clients skip TLS certificate validation.
    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    /// The pool requests draw clients from unless they set their own.
    pub fn client_pool(&self) -> &Arc<dyn ClientPool> {
        &self.client_pool
    }

    /// Builds a fresh default proxy, if a factory is configured.
    pub fn default_proxy(&self) -> Option<ProxySettings> {
        self.default_proxy_factory.as_ref().map(|factory| factory())
    }

    pub(crate) fn run_before_send(&self, metadata: &mut RequestMetadata) {
        for hook in &self.before_send {
            hook(metadata);
        }
    }

    pub(crate) fn run_exception(&self, args: &ExceptionArgs<'_>) {
        for hook in &self.exception {
            hook(args);
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("user_agent", &self.user_agent)
            .field("error_data_prefix", &self.error_data_prefix)
            .field("default_timeout", &self.default_timeout)
            .field("default_proxy_factory", &self.default_proxy_factory.is_some())
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("before_send", &self.before_send.len())
            .field("exception", &self.exception.len())
            .finish_non_exhaustive()
    }
}

/// Restores the previous default settings when dropped.
#[must_use = "the previous settings are restored when the guard is dropped"]
pub struct CurrentSettingsGuard {
    previous: Option<Arc<Settings>>,
}

impl Drop for CurrentSettingsGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            Settings::set_current(previous);
        }
    }
}

/// Resolved configuration values for [`Settings`].
///
/// Deserializable so values from an external configuration source can be
/// applied with [`SettingsBuilder::apply_config`]. Unset fields keep the
/// builder's values.
///
/// # Examples
///
/// ```
/// use httpcall::{Settings, SettingsConfig};
///
/// let config: SettingsConfig = serde_json::from_str(
///     r#"{ "user_agent": "svc/2.0", "default_timeout_ms": 1500 }"#,
/// ).unwrap();
///
/// let settings = Settings::builder().apply_config(&config).build();
/// assert_eq!(settings.user_agent(), "svc/2.0");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// The `User-Agent` header
    pub user_agent: Option<String>,
    /// The default timeout in milliseconds
    pub default_timeout_ms: Option<u64>,
    /// The prefix for error context keys
    pub error_data_prefix: Option<String>,
    /// Skip TLS certificate validation
    pub accept_invalid_certs: Option<bool>,
}

/// Builder for [`Settings`].
pub struct SettingsBuilder {
    user_agent: String,
    error_data_prefix: String,
    default_timeout: Duration,
    default_proxy_factory: Option<ProxyFactory>,
    accept_invalid_certs: bool,
    client_pool: Option<Arc<dyn ClientPool>>,
    before_send: Vec<BeforeSendHook>,
    exception: Vec<ExceptionHook>,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            error_data_prefix: DEFAULT_ERROR_DATA_PREFIX.to_string(),
            default_timeout: DEFAULT_TIMEOUT,
            default_proxy_factory: None,
            accept_invalid_certs: false,
            client_pool: None,
            before_send: Vec::new(),
            exception: Vec::new(),
        }
    }
}

impl SettingsBuilder {
    /// Sets the `User-Agent` header. An empty string sends none.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the prefix for error context keys handed to log sinks.
    pub fn error_data_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.error_data_prefix = prefix.into();
        self
    }

    /// Sets the timeout for requests that do not set one.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the factory for the proxy of requests that do not set one.
    ///
    /// The factory is called for every send, so it must return a new value each
    /// time; changes a request makes to its proxy never reach the default.
    pub fn default_proxy_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> ProxySettings + Send + Sync + 'static,
    {
        self.default_proxy_factory = Some(Arc::new(factory));
        self
    }

    /// Skips TLS certificate validation on pooled clients.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Uses `pool` instead of a [`DefaultClientPool`].
    pub fn client_pool(mut self, pool: Arc<dyn ClientPool>) -> Self {
        self.client_pool = Some(pool);
        self
    }

    /// Appends a hook that runs before every send.
    pub fn on_before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestMetadata) + Send + Sync + 'static,
    {
        self.before_send.push(Arc::new(hook));
        self
    }

    /// Appends a hook that receives every logged failure.
    pub fn on_exception<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExceptionArgs<'_>) + Send + Sync + 'static,
    {
        self.exception.push(Arc::new(hook));
        self
    }

    /// Applies the values set in `config`.
    pub fn apply_config(mut self, config: &SettingsConfig) -> Self {
        if let Some(user_agent) = &config.user_agent {
            self.user_agent = user_agent.clone();
        }
        if let Some(timeout_ms) = config.default_timeout_ms {
            self.default_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(prefix) = &config.error_data_prefix {
            self.error_data_prefix = prefix.clone();
        }
        if let Some(accept) = config.accept_invalid_certs {
            self.accept_invalid_certs = accept;
        }
        self
    }

    /// Builds the `Settings`.
    pub fn build(self) -> Settings {
        let client_pool = self.client_pool.unwrap_or_else(|| {
            Arc::new(DefaultClientPool::new(ClientOptions {
                user_agent: self.user_agent.clone(),
                accept_invalid_certs: self.accept_invalid_certs,
            }))
        });

        Settings {
            user_agent: self.user_agent,
            error_data_prefix: self.error_data_prefix,
            default_timeout: self.default_timeout,
            default_proxy_factory: self.default_proxy_factory,
            accept_invalid_certs: self.accept_invalid_certs,
            client_pool,
            before_send: self.before_send,
            exception: self.exception,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::HttpProxy;
    use http::HeaderValue;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.user_agent(), DEFAULT_USER_AGENT);
        assert_eq!(settings.default_timeout(), Duration::from_secs(3));
        assert!(settings.default_proxy().is_none());
        assert!(!settings.accept_invalid_certs());
    }

    #[test]
    fn test_before_send_hooks_run_in_order() {
        let settings = Settings::builder()
            .on_before_send(|m| {
                m.headers.insert("x-order", HeaderValue::from_static("first"));
            })
            .on_before_send(|m| {
                m.headers.insert("x-order", HeaderValue::from_static("second"));
            })
            .build();

        let mut metadata = RequestMetadata::new("http://example.com");
        settings.run_before_send(&mut metadata);
        assert_eq!(metadata.headers["x-order"], "second");
    }

    #[test]
    fn test_default_proxy_factory_builds_fresh_values() {
        let settings = Settings::builder()
            .default_proxy_factory(|| {
                ProxySettings::new(HttpProxy::all("http://127.0.0.1:3128").unwrap())
            })
            .build();

        let one = settings.default_proxy().unwrap();
        let two = settings.default_proxy().unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn test_apply_config() {
        let config: SettingsConfig = serde_json::from_str(
            r#"{"user_agent": "svc/2.0", "default_timeout_ms": 1500, "accept_invalid_certs": true}"#,
        )
        .unwrap();

        let settings = Settings::builder()
            .error_data_prefix("X-")
            .apply_config(&config)
            .build();

        assert_eq!(settings.user_agent(), "svc/2.0");
        assert_eq!(settings.default_timeout(), Duration::from_millis(1500));
        assert_eq!(settings.error_data_prefix(), "X-");
        assert!(settings.accept_invalid_certs());
    }

    #[test]
    fn test_scoped_restores_previous() {
        let replacement = Arc::new(Settings::builder().user_agent("scoped/1.0").build());
        let before = Settings::current();

        {
            let _guard = Settings::scoped(Arc::clone(&replacement));
            assert!(Arc::ptr_eq(&Settings::current(), &replacement));
        }

        assert!(Arc::ptr_eq(&Settings::current(), &before));
    }
}

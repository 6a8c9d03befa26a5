//! Proxy descriptors.
//!
//! The client pool keys on proxy settings, so the equality rules here decide
//! when two requests share a transport client. [`ProxySettings`] compares by
//! value. [`HttpProxy`] wraps a caller-supplied `reqwest::Proxy` and compares
//! by identity: two proxies built from the same URL are still different keys
//! unless they are clones of the same `HttpProxy`.

use crate::{Error, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A shared handle to a `reqwest::Proxy`, compared by identity.
///
/// # Examples
///
/// ```
/// use httpcall::HttpProxy;
///
/// let proxy = HttpProxy::all("http://proxy.internal:3128").unwrap();
/// let same = proxy.clone();
/// let other = HttpProxy::all("http://proxy.internal:3128").unwrap();
///
/// assert_eq!(proxy, same);
/// assert_ne!(proxy, other);
/// ```
#[derive(Clone)]
pub struct HttpProxy {
    inner: Arc<reqwest::Proxy>,
}

impl HttpProxy {
    /// Wraps an existing `reqwest::Proxy`.
    pub fn new(proxy: reqwest::Proxy) -> Self {
        Self {
            inner: Arc::new(proxy),
        }
    }

    /// Creates a proxy used for all traffic.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid.
    pub fn all(url: &str) -> Result<Self> {
        reqwest::Proxy::all(url)
            .map(Self::new)
            .map_err(|source| Error::ClientBuild { source })
    }

    pub(crate) fn to_reqwest(&self) -> reqwest::Proxy {
        (*self.inner).clone()
    }
}

impl PartialEq for HttpProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for HttpProxy {}

impl Hash for HttpProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Debug for HttpProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HttpProxy").field(&self.inner).finish()
    }
}

/// Proxy configuration for a request.
///
/// * `use_proxy == false` disables proxying entirely, including system proxies.
/// * `use_proxy == true` with `proxy == None` uses the system proxy configuration.
/// * `use_proxy == true` with a proxy routes through that proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProxySettings {
    /// Whether the request should go through a proxy at all
    pub use_proxy: bool,
    /// The proxy to use, or `None` for the system configuration
    pub proxy: Option<HttpProxy>,
}

impl ProxySettings {
    /// Routes requests through `proxy`.
    pub fn new(proxy: HttpProxy) -> Self {
        Self {
            use_proxy: true,
            proxy: Some(proxy),
        }
    }

    /// Uses the system proxy configuration.
    pub fn system() -> Self {
        Self {
            use_proxy: true,
            proxy: None,
        }
    }

    /// Disables proxying.
    pub fn disabled() -> Self {
        Self::default()
    }
}

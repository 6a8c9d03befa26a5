//! Pooling of transport clients.
//!
//! A `reqwest::Client` bakes its timeout and proxy in at construction, so the
//! pool keeps one client per `(timeout, proxy)` pair and shares it between every
//! request with that pair. Nothing else about a request (headers, body, URI)
//! affects which client it gets.

use crate::metadata::RequestMetadata;
use crate::proxy::ProxySettings;
use crate::{Error, Result};
use dashmap::DashMap;
use http::header::ACCEPT_ENCODING;
use http::{HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The connection-affecting options a pooled client is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    timeout: Duration,
    proxy: Option<ProxySettings>,
}

impl ClientKey {
    /// Creates a key from a timeout and proxy.
    pub fn new(timeout: Duration, proxy: Option<ProxySettings>) -> Self {
        Self { timeout, proxy }
    }

    /// Derives the key a request maps to.
    pub fn from_metadata(metadata: &RequestMetadata) -> Self {
        Self::new(metadata.effective_timeout(), metadata.proxy.clone())
    }

    /// The timeout clients under this key are built with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The proxy clients under this key are built with.
    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }
}

/// A transport client shared by every request with the same [`ClientKey`].
#[derive(Debug)]
pub struct PooledClient {
    client: reqwest::Client,
    key: ClientKey,
}

impl PooledClient {
    /// Wraps a client built for `key`.
    pub fn new(client: reqwest::Client, key: ClientKey) -> Self {
        Self { client, key }
    }

    /// The underlying transport client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The key this client was built for.
    pub fn key(&self) -> &ClientKey {
        &self.key
    }
}

/// Counters reported by a pool, added to failure diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Clients currently pooled
    pub clients: usize,
    /// Clients constructed since the pool was created
    pub created: u64,
}

/// A source of transport clients.
///
/// Implementations must be safe to call concurrently. The default is
/// [`DefaultClientPool`]; a different pool can be set on
/// [`Settings`](crate::Settings) or per request.
pub trait ClientPool: Send + Sync {
    /// Returns the client for `metadata`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a new client cannot be constructed.
    fn get(&self, metadata: &RequestMetadata) -> Result<Arc<PooledClient>>;

    /// Drops every pooled client; later calls to `get` build new ones.
    fn clear(&self);

    /// Returns pool counters, if the pool keeps any.
    fn stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Options applied to every client a [`DefaultClientPool`] builds.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// The `User-Agent` header; empty to send none
    pub user_agent: String,
    /// Skip TLS certificate validation
    pub accept_invalid_certs: bool,
}

/// The default [`ClientPool`]: one client per [`ClientKey`], created on first use.
///
/// Concurrent `get` calls with equal keys construct the client once; the others
/// receive the same instance.
#[derive(Debug)]
pub struct DefaultClientPool {
    clients: DashMap<ClientKey, Arc<PooledClient>>,
    options: ClientOptions,
    created: AtomicU64,
}

impl DefaultClientPool {
    /// Creates an empty pool.
    pub fn new(options: ClientOptions) -> Self {
        Self {
            clients: DashMap::new(),
            options,
            created: AtomicU64::new(0),
        }
    }

    /// Returns the number of pooled clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no clients are pooled.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Returns the number of clients constructed so far.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    fn build_client(&self, key: &ClientKey) -> Result<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

        // No cookie store is enabled, so the client keeps no cookie jar.
        let mut builder = reqwest::Client::builder()
            .timeout(key.timeout)
            .gzip(true)
            .deflate(true)
            .default_headers(headers);

        if !self.options.user_agent.is_empty() {
            builder = builder.user_agent(self.options.user_agent.as_str());
        }

        match &key.proxy {
            Some(ProxySettings {
                use_proxy: false, ..
            }) => builder = builder.no_proxy(),
            Some(ProxySettings {
                use_proxy: true,
                proxy: Some(proxy),
            }) => builder = builder.proxy(proxy.to_reqwest()),
            _ => {}
        }

        if self.options.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(|source| Error::ClientBuild { source })
    }
}

impl ClientPool for DefaultClientPool {
    fn get(&self, metadata: &RequestMetadata) -> Result<Arc<PooledClient>> {
        let key = ClientKey::from_metadata(metadata);

        if let Some(existing) = self.clients.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let entry = self.clients.entry(key.clone()).or_try_insert_with(|| {
            let client = self.build_client(&key)?;
            let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(
                timeout_ms = key.timeout.as_millis() as u64,
                proxy = ?key.proxy,
                created = created,
                "Created pooled HTTP client"
            );
            Ok::<_, Error>(Arc::new(PooledClient::new(client, key.clone())))
        })?;

        Ok(Arc::clone(entry.value()))
    }

    fn clear(&self) {
        debug!(clients = self.clients.len(), "Clearing HTTP client pool");
        self.clients.clear();
    }

    fn stats(&self) -> Option<PoolStats> {
        Some(PoolStats {
            clients: self.clients.len(),
            created: self.created(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::HttpProxy;

    fn metadata(timeout: Option<Duration>, proxy: Option<ProxySettings>) -> RequestMetadata {
        let mut metadata = RequestMetadata::new("http://example.com");
        metadata.timeout = timeout;
        metadata.proxy = proxy;
        metadata
    }

    fn keys_equal(one: &RequestMetadata, two: &RequestMetadata) -> bool {
        ClientKey::from_metadata(one) == ClientKey::from_metadata(two)
    }

    #[test]
    fn test_key_equality_defaults() {
        assert!(keys_equal(&metadata(None, None), &metadata(None, None)));
    }

    #[test]
    fn test_key_equality_timeout() {
        let ten = Some(Duration::from_secs(10));
        let twenty = Some(Duration::from_secs(20));

        assert!(keys_equal(&metadata(ten, None), &metadata(ten, None)));
        assert!(!keys_equal(&metadata(ten, None), &metadata(twenty, None)));
    }

    #[test]
    fn test_key_equality_use_proxy() {
        assert!(keys_equal(
            &metadata(None, Some(ProxySettings::system())),
            &metadata(None, Some(ProxySettings::system()))
        ));
        assert!(!keys_equal(
            &metadata(None, Some(ProxySettings::system())),
            &metadata(None, Some(ProxySettings::disabled()))
        ));
    }

    #[test]
    fn test_key_equality_proxy_instances() {
        let proxy = HttpProxy::all("http://127.0.0.1:3128").unwrap();
        assert!(keys_equal(
            &metadata(None, Some(ProxySettings::new(proxy.clone()))),
            &metadata(None, Some(ProxySettings::new(proxy)))
        ));

        assert!(!keys_equal(
            &metadata(None, Some(ProxySettings::new(HttpProxy::all("http://127.0.0.1:3128").unwrap()))),
            &metadata(None, Some(ProxySettings::new(HttpProxy::all("http://127.0.0.1:3128").unwrap())))
        ));
    }

    #[test]
    fn test_key_equality_timeout_and_proxy() {
        let ten = Some(Duration::from_secs(10));
        assert!(keys_equal(
            &metadata(ten, Some(ProxySettings::system())),
            &metadata(ten, Some(ProxySettings::system()))
        ));
    }

    #[test]
    fn test_get_reuses_client_for_equal_keys() {
        let pool = DefaultClientPool::new(ClientOptions::default());

        let mut with_header = metadata(None, None);
        with_header
            .headers
            .insert("x-other", HeaderValue::from_static("1"));

        let one = pool.get(&metadata(None, None)).unwrap();
        let two = pool.get(&with_header).unwrap();

        assert!(Arc::ptr_eq(&one, &two));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.created(), 1);
    }

    #[test]
    fn test_get_builds_new_client_for_new_timeout() {
        let pool = DefaultClientPool::new(ClientOptions::default());

        let one = pool.get(&metadata(Some(Duration::from_secs(1)), None)).unwrap();
        let two = pool.get(&metadata(Some(Duration::from_secs(2)), None)).unwrap();

        assert!(!Arc::ptr_eq(&one, &two));
        assert_eq!(two.key().timeout(), Duration::from_secs(2));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_clear_rebuilds() {
        let pool = DefaultClientPool::new(ClientOptions::default());

        let before = pool.get(&metadata(None, None)).unwrap();
        pool.clear();
        assert!(pool.is_empty());

        let after = pool.get(&metadata(None, None)).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(
            pool.stats(),
            Some(PoolStats {
                clients: 1,
                created: 2
            })
        );
    }

    #[test]
    fn test_concurrent_get_constructs_once() {
        let pool = DefaultClientPool::new(ClientOptions::default());

        let clients: Vec<Arc<PooledClient>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| pool.get(&metadata(None, None)).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(pool.created(), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }
}

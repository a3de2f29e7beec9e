//! Proxy configuration watchers.
//!
//! `AgentConfigWatcher` long-polls the registry and publishes every distinct
//! configuration on a capacity-one channel. `StaticConfigWatcher` publishes a
//! single fixed configuration.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::decode::{decode_registration, DecodeError};
use crate::config::schema::Config;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{ProxyRegistration, QueryMeta, QueryOptions, Registry, RegistryError};
use crate::resilience::backoff::calculate_backoff;

/// Source of configuration snapshots for a single consumer.
pub trait ConfigWatcher: Send {
    /// Channel of distinct configurations, oldest first.
    ///
    /// Returns the same receiver on every call; the `&mut` borrow keeps it
    /// to one consumer at a time.
    fn watch(&mut self) -> &mut mpsc::Receiver<Arc<Config>>;

    /// Stop producing. The channel closes once buffered values are drained.
    fn close(&mut self);
}

/// Errors constructing a watcher.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The registry has no managed proxy under this ID.
    #[error("no managed proxy registration for '{0}'")]
    NotFound(String),

    /// The initial registry read failed.
    #[error("initial registry read failed: {0}")]
    Registry(#[source] RegistryError),

    /// The initial registration could not be decoded.
    #[error("initial proxy config is invalid: {0}")]
    Decode(#[from] DecodeError),
}

impl From<RegistryError> for WatchError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => WatchError::NotFound(id),
            other => WatchError::Registry(other),
        }
    }
}

/// Tuning for the background polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Server-side wait per blocking read. Bounds how long cancellation can take
    /// to reach the registry and how stale liveness can get.
    pub wait_time: Duration,
    /// First retry delay after a failed read.
    pub retry_base: Duration,
    /// Upper bound on the retry delay.
    pub retry_max: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(10),
            retry_base: Duration::from_millis(500),
            retry_max: Duration::from_secs(30),
        }
    }
}

/// Watches the registry for changes to one proxy's configuration.
pub struct AgentConfigWatcher {
    proxy_id: String,
    updates: mpsc::Receiver<Arc<Config>>,
    shutdown: Shutdown,
    task: Option<JoinHandle<()>>,
}

impl AgentConfigWatcher {
    /// Fetch the current registration and start watching for changes.
    ///
    /// The initial configuration is the first value delivered by `watch()`.
    /// Fails with [`WatchError::NotFound`] if no proxy is registered under
    /// `proxy_id`.
    pub async fn new<R>(client: Arc<R>, proxy_id: &str, options: WatchOptions) -> Result<Self, WatchError>
    where
        R: Registry + 'static,
    {
        let query = QueryOptions {
            wait_time: options.wait_time,
            ..Default::default()
        };
        let (registration, meta) = client.proxy_config(proxy_id, &query).await?;

        let decoded = decode_registration(&registration)?;
        warn_unrecognized(proxy_id, &decoded.unrecognized_keys);
        let initial = Arc::new(decoded.config);
        metrics::record_config_update(proxy_id);

        tracing::info!(
            proxy_id,
            service = %initial.proxied_service_name,
            upstreams = initial.upstreams.len(),
            index = meta.last_index,
            "Proxy config loaded"
        );

        let (tx, updates) = mpsc::channel(1);
        let shutdown = Shutdown::new();

        let watch_loop = WatchLoop {
            client,
            proxy_id: proxy_id.to_string(),
            options,
            tx,
            last: initial.clone(),
            wait_index: next_wait_index(0, meta.last_index),
            wait_hash: meta.content_hash,
            shutdown: shutdown.subscribe(),
        };
        let task = tokio::spawn(watch_loop.run(initial));

        Ok(Self {
            proxy_id: proxy_id.to_string(),
            updates,
            shutdown,
            task: Some(task),
        })
    }

    /// The proxy being watched.
    pub fn proxy_id(&self) -> &str {
        &self.proxy_id
    }

    /// Handle that cancels the watcher from another task.
    pub fn closer(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Cancel the background loop and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.trigger();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(proxy_id = %self.proxy_id, error = %e, "Config watcher task failed");
            }
        }
    }
}

impl ConfigWatcher for AgentConfigWatcher {
    fn watch(&mut self) -> &mut mpsc::Receiver<Arc<Config>> {
        &mut self.updates
    }

    fn close(&mut self) {
        self.shutdown.trigger();
    }
}

impl Drop for AgentConfigWatcher {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl std::fmt::Debug for AgentConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfigWatcher")
            .field("proxy_id", &self.proxy_id)
            .field("running", &self.task.as_ref().is_some_and(|t| !t.is_finished()))
            .finish()
    }
}

/// State owned by the background loop. Nothing else touches it.
struct WatchLoop<R> {
    client: Arc<R>,
    proxy_id: String,
    options: WatchOptions,
    tx: mpsc::Sender<Arc<Config>>,
    /// Last configuration produced, delivered or pending.
    last: Arc<Config>,
    wait_index: u64,
    /// Set when the registry blocks on content hashes instead of indexes.
    wait_hash: Option<String>,
    shutdown: broadcast::Receiver<()>,
}

impl<R: Registry> WatchLoop<R> {
    async fn run(mut self, initial: Arc<Config>) {
        let mut pending = Some(initial);
        let mut failures: u32 = 0;
        let mut early_returns: u32 = 0;

        loop {
            if let Some(config) = pending.take() {
                tokio::select! {
                    biased;
                    _ = self.shutdown.recv() => break,
                    sent = self.tx.send(config) => {
                        if sent.is_err() {
                            tracing::debug!(proxy_id = %self.proxy_id, "Config consumer dropped, stopping watcher");
                            break;
                        }
                    }
                }
            }

            let query = QueryOptions {
                wait_index: self.wait_index,
                wait_hash: self.wait_hash.clone(),
                wait_time: self.options.wait_time,
            };
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                res = self.client.proxy_config(&self.proxy_id, &query) => res,
            };

            let delay = match result {
                Ok((registration, meta)) => {
                    failures = 0;
                    if self.advance(meta) {
                        early_returns = 0;
                        pending = self.on_registration(&registration);
                        continue;
                    }
                    // Nothing changed. A read that came back well before the
                    // wait elapsed did not block, so pace the next one.
                    if started.elapsed() >= self.options.wait_time / 2 {
                        early_returns = 0;
                        continue;
                    }
                    early_returns = early_returns.saturating_add(1);
                    let delay = calculate_backoff(early_returns, self.options.retry_base, self.options.retry_max);
                    tracing::debug!(
                        proxy_id = %self.proxy_id,
                        index = self.wait_index,
                        delay = ?delay,
                        "Registry read returned early without changes"
                    );
                    delay
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    metrics::record_registry_error(&e);
                    let delay = calculate_backoff(failures, self.options.retry_base, self.options.retry_max);
                    tracing::warn!(
                        proxy_id = %self.proxy_id,
                        error = %e,
                        attempt = failures,
                        delay = ?delay,
                        "Registry read failed, retrying"
                    );
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(proxy_id = %self.proxy_id, "Config watcher stopped");
    }

    /// Record the blocking token from `meta`; true when it signals a change.
    fn advance(&mut self, meta: QueryMeta) -> bool {
        let previous_index = self.wait_index;
        let previous_hash = std::mem::replace(&mut self.wait_hash, meta.content_hash);
        self.advance_index(meta.last_index);

        match (previous_hash, &self.wait_hash) {
            (Some(old), Some(new)) => old != *new,
            _ => self.wait_index != previous_index,
        }
    }

    fn advance_index(&mut self, last_index: u64) {
        let next = next_wait_index(self.wait_index, last_index);
        if next == 0 {
            tracing::debug!(
                proxy_id = %self.proxy_id,
                previous = self.wait_index,
                current = last_index,
                "Registry index went backwards, resetting"
            );
        }
        self.wait_index = next;
        metrics::record_wait_index(self.wait_index);
    }

    /// Decode a registration and return it if it differs from the last one produced.
    fn on_registration(&mut self, registration: &ProxyRegistration) -> Option<Arc<Config>> {
        let decoded = match decode_registration(registration) {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics::record_decode_error(&self.proxy_id);
                tracing::error!(
                    proxy_id = %self.proxy_id,
                    error = %e,
                    "Failed to decode proxy config update. Keeping current configuration."
                );
                return None;
            }
        };
        warn_unrecognized(&self.proxy_id, &decoded.unrecognized_keys);

        if decoded.config == *self.last {
            tracing::trace!(proxy_id = %self.proxy_id, "Proxy config unchanged");
            return None;
        }

        let config = Arc::new(decoded.config);
        self.last = config.clone();
        metrics::record_config_update(&self.proxy_id);
        tracing::info!(
            proxy_id = %self.proxy_id,
            upstreams = config.upstreams.len(),
            index = self.wait_index,
            "Proxy config changed"
        );
        Some(config)
    }
}

/// Wait index for the next read after the registry reported `last_index`.
///
/// An index of 0 would make the next read return at once, so it is treated
/// as 1. An index that moved backwards means the registry state was reset;
/// start over from 0 to re-sync.
fn next_wait_index(current: u64, last_index: u64) -> u64 {
    let last_index = last_index.max(1);
    if last_index < current {
        0
    } else {
        last_index
    }
}

fn warn_unrecognized(proxy_id: &str, keys: &[String]) {
    if !keys.is_empty() {
        tracing::warn!(proxy_id, keys = ?keys, "Ignoring unrecognized proxy config keys");
    }
}

/// Watcher that delivers one fixed configuration and never changes.
pub struct StaticConfigWatcher {
    updates: mpsc::Receiver<Arc<Config>>,
    tx: Option<mpsc::Sender<Arc<Config>>>,
}

impl StaticConfigWatcher {
    /// Create a watcher for `config`. Defaults are applied before delivery.
    pub fn new(config: Config) -> Self {
        let (tx, updates) = mpsc::channel(1);
        // Fresh channel with one free slot; this cannot fail.
        let _ = tx.try_send(Arc::new(config.with_defaults()));
        Self {
            updates,
            tx: Some(tx),
        }
    }
}

impl ConfigWatcher for StaticConfigWatcher {
    fn watch(&mut self) -> &mut mpsc::Receiver<Arc<Config>> {
        &mut self.updates
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::UpstreamConfig;
    use crate::registry::MemoryRegistry;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Registry that replays a fixed list of responses and records every
    /// query it receives. Once the list is exhausted it either repeats the
    /// last response or blocks forever.
    struct ScriptedRegistry {
        script: Mutex<VecDeque<(ProxyRegistration, QueryMeta)>>,
        last: Mutex<Option<(ProxyRegistration, QueryMeta)>>,
        repeat_last: bool,
        queries: Mutex<Vec<QueryOptions>>,
    }

    impl ScriptedRegistry {
        fn new(script: Vec<(ProxyRegistration, QueryMeta)>, repeat_last: bool) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                repeat_last,
                queries: Mutex::new(Vec::new()),
            }
        }

        fn queries(&self) -> Vec<QueryOptions> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Registry for ScriptedRegistry {
        async fn proxy_config(
            &self,
            _proxy_id: &str,
            opts: &QueryOptions,
        ) -> Result<(ProxyRegistration, QueryMeta), RegistryError> {
            self.queries.lock().unwrap().push(opts.clone());
            let next = self.script.lock().unwrap().pop_front();
            let next = match next {
                Some(response) => Some(response),
                None if self.repeat_last => self.last.lock().unwrap().clone(),
                None => None,
            };
            match next {
                Some(response) => {
                    *self.last.lock().unwrap() = Some(response.clone());
                    Ok(response)
                }
                None => std::future::pending().await,
            }
        }
    }

    fn at_index(reg: ProxyRegistration, last_index: u64) -> (ProxyRegistration, QueryMeta) {
        let meta = QueryMeta {
            last_index,
            content_hash: None,
        };
        (reg, meta)
    }

    fn with_hash(reg: ProxyRegistration, hash: &str) -> (ProxyRegistration, QueryMeta) {
        let meta = QueryMeta {
            last_index: 0,
            content_hash: Some(hash.to_string()),
        };
        (reg, meta)
    }

    fn bound_to(port: u64) -> ProxyRegistration {
        let mut reg = registration();
        reg.config.insert("bind_port".into(), port.into());
        reg
    }

    fn fast_options() -> WatchOptions {
        WatchOptions {
            wait_time: Duration::from_millis(200),
            retry_base: Duration::from_millis(10),
            retry_max: Duration::from_millis(50),
        }
    }

    fn registration() -> ProxyRegistration {
        let mut reg = ProxyRegistration {
            proxy_service_id: "web-proxy".into(),
            target_service_id: "web".into(),
            target_service_name: "web".into(),
            ..Default::default()
        };
        reg.config.insert("bind_port".into(), 1010.into());
        reg
    }

    #[tokio::test]
    async fn test_static_watcher_delivers_once_and_stays_open() {
        let mut watcher = StaticConfigWatcher::new(Config {
            proxied_service_name: "web".into(),
            upstreams: vec![UpstreamConfig {
                destination_name: "db".into(),
                ..Default::default()
            }],
            ..Default::default()
        });

        let cfg = watcher.watch().recv().await.unwrap();
        assert_eq!(cfg.proxied_service_namespace, "default");
        assert_eq!(cfg.upstreams[0].local_bind_address, "127.0.0.1");

        let next = tokio::time::timeout(Duration::from_millis(50), watcher.watch().recv()).await;
        assert!(next.is_err(), "static watcher must not emit again");

        watcher.close();
        assert!(watcher.watch().recv().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_registration_is_not_found() {
        let registry = Arc::new(MemoryRegistry::new());
        let err = AgentConfigWatcher::new(registry, "web-proxy", fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::NotFound(id) if id == "web-proxy"));
    }

    #[tokio::test]
    async fn test_invalid_initial_config_fails_construction() {
        let registry = Arc::new(MemoryRegistry::new());
        let mut reg = registration();
        reg.config.insert("bind_port".into(), "oops".into());
        registry.register(reg);

        let err = AgentConfigWatcher::new(registry, "web-proxy", fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, WatchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_decode_error_keeps_last_good_config() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register(registration());

        let mut watcher = AgentConfigWatcher::new(registry.clone(), "web-proxy", fast_options())
            .await
            .unwrap();
        let first = watcher.watch().recv().await.unwrap();
        assert_eq!(first.public_listener.bind_port, 1010);

        let mut bad = registration();
        bad.config.insert("bind_port".into(), "oops".into());
        registry.register(bad);

        let none = tokio::time::timeout(Duration::from_millis(300), watcher.watch().recv()).await;
        assert!(none.is_err(), "bad update must not be delivered");

        let mut good = registration();
        good.config.insert("bind_port".into(), 2020.into());
        registry.register(good);

        let next = tokio::time::timeout(Duration::from_secs(2), watcher.watch().recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.public_listener.bind_port, 2020);

        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_deregistration_is_retried_not_surfaced() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register(registration());

        let mut watcher = AgentConfigWatcher::new(registry.clone(), "web-proxy", fast_options())
            .await
            .unwrap();
        watcher.watch().recv().await.unwrap();

        registry.deregister("web-proxy");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut reg = registration();
        reg.config.insert("bind_address".into(), "10.0.0.1".into());
        registry.register(reg);

        let next = tokio::time::timeout(Duration::from_secs(2), watcher.watch().recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.public_listener.bind_address, "10.0.0.1");

        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.register(registration());

        let mut watcher = AgentConfigWatcher::new(registry, "web-proxy", fast_options())
            .await
            .unwrap();
        watcher.watch().recv().await.unwrap();

        watcher.close();
        let end = tokio::time::timeout(Duration::from_secs(1), watcher.watch().recv())
            .await
            .unwrap();
        assert!(end.is_none());
    }

    #[test]
    fn test_next_wait_index() {
        assert_eq!(next_wait_index(0, 0), 1);
        assert_eq!(next_wait_index(1, 0), 1);
        assert_eq!(next_wait_index(5, 9), 9);
        assert_eq!(next_wait_index(10, 3), 0);
        assert_eq!(next_wait_index(0, 3), 3);
    }

    #[tokio::test]
    async fn test_zero_index_reads_are_paced() {
        let registry = Arc::new(ScriptedRegistry::new(vec![at_index(registration(), 0)], true));
        let options = WatchOptions {
            wait_time: Duration::from_secs(10),
            retry_base: Duration::from_millis(10),
            retry_max: Duration::from_millis(100),
        };

        let mut watcher = AgentConfigWatcher::new(registry.clone(), "web-proxy", options)
            .await
            .unwrap();
        watcher.watch().recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let queries = registry.queries();
        assert!(queries.len() < 15, "{} reads in 300ms", queries.len());
        assert!(queries[1..].iter().all(|q| q.wait_index == 1));

        let extra = tokio::time::timeout(Duration::from_millis(50), watcher.watch().recv()).await;
        assert!(extra.is_err());
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_index_reset_resyncs_from_zero() {
        let registry = Arc::new(ScriptedRegistry::new(
            vec![
                at_index(registration(), 10),
                at_index(registration(), 3),
                at_index(bound_to(2020), 4),
            ],
            false,
        ));

        let mut watcher = AgentConfigWatcher::new(registry.clone(), "web-proxy", fast_options())
            .await
            .unwrap();
        assert_eq!(watcher.watch().recv().await.unwrap().public_listener.bind_port, 1010);

        let next = tokio::time::timeout(Duration::from_secs(1), watcher.watch().recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.public_listener.bind_port, 2020);

        let extra = tokio::time::timeout(Duration::from_millis(200), watcher.watch().recv()).await;
        assert!(extra.is_err(), "changed config must be emitted once");

        let indexes: Vec<u64> = registry.queries().iter().map(|q| q.wait_index).collect();
        assert_eq!(indexes, vec![0, 10, 0, 4]);
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_content_hash_signals_changes() {
        let registry = Arc::new(ScriptedRegistry::new(
            vec![
                with_hash(registration(), "a1"),
                with_hash(registration(), "a1"),
                with_hash(bound_to(2020), "b2"),
            ],
            false,
        ));

        let mut watcher = AgentConfigWatcher::new(registry.clone(), "web-proxy", fast_options())
            .await
            .unwrap();
        watcher.watch().recv().await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(1), watcher.watch().recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.public_listener.bind_port, 2020);

        let extra = tokio::time::timeout(Duration::from_millis(200), watcher.watch().recv()).await;
        assert!(extra.is_err());

        let hashes: Vec<Option<String>> = registry.queries().into_iter().map(|q| q.wait_hash).collect();
        assert_eq!(
            hashes,
            vec![None, Some("a1".into()), Some("a1".into()), Some("b2".into())]
        );
        watcher.shutdown().await;
    }
}

//! In-process registry with blocking-query semantics.
//!
//! Every write bumps a single monotonically increasing index, the same way
//! the agent does. Reads with a `wait_index` park until the index moves past
//! it or the wait elapses.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::registry::types::{ProxyRegistration, QueryMeta, QueryOptions, RegistryError};
use crate::registry::Registry;

/// Registry held entirely in memory.
pub struct MemoryRegistry {
    proxies: Mutex<HashMap<String, ProxyRegistration>>,
    index: watch::Sender<u64>,
}

impl MemoryRegistry {
    /// Create an empty registry at index 1.
    pub fn new() -> Self {
        let (index, _) = watch::channel(1);
        Self {
            proxies: Mutex::new(HashMap::new()),
            index,
        }
    }

    /// Register or replace a proxy. Returns the new index.
    pub fn register(&self, registration: ProxyRegistration) -> u64 {
        let id = registration.proxy_service_id.clone();
        self.lock().insert(id, registration);
        self.bump()
    }

    /// Remove a proxy. Returns the new index.
    pub fn deregister(&self, proxy_id: &str) -> u64 {
        self.lock().remove(proxy_id);
        self.bump()
    }

    /// Advance the index without changing any proxy, as an unrelated write would.
    pub fn touch(&self) -> u64 {
        self.bump()
    }

    /// Current registry index.
    pub fn index(&self) -> u64 {
        *self.index.borrow()
    }

    fn bump(&self) -> u64 {
        let mut next = 0;
        self.index.send_modify(|idx| {
            *idx += 1;
            next = *idx;
        });
        next
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProxyRegistration>> {
        // A poisoned map is still structurally valid; writers never leave it half-updated.
        self.proxies.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, proxy_id: &str) -> Result<(ProxyRegistration, QueryMeta), RegistryError> {
        let last_index = self.index();
        self.lock()
            .get(proxy_id)
            .cloned()
            .map(|reg| {
                let meta = QueryMeta {
                    last_index,
                    content_hash: None,
                };
                (reg, meta)
            })
            .ok_or_else(|| RegistryError::NotFound(proxy_id.to_string()))
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn proxy_config(
        &self,
        proxy_id: &str,
        opts: &QueryOptions,
    ) -> Result<(ProxyRegistration, QueryMeta), RegistryError> {
        let mut changes = self.index.subscribe();
        let current = *changes.borrow_and_update();

        if opts.wait_index > 0 && current <= opts.wait_index {
            let wait_index = opts.wait_index;
            let _ = tokio::time::timeout(opts.wait_time, async {
                while changes.changed().await.is_ok() {
                    if *changes.borrow_and_update() > wait_index {
                        break;
                    }
                }
            })
            .await;
        }

        self.lookup(proxy_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn registration(id: &str) -> ProxyRegistration {
        ProxyRegistration {
            proxy_service_id: id.to_string(),
            target_service_name: "web".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_proxy_is_not_found() {
        let registry = MemoryRegistry::new();
        let err = registry
            .proxy_config("web-proxy", &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_non_blocking_read() {
        let registry = MemoryRegistry::new();
        let idx = registry.register(registration("web-proxy"));

        let (reg, meta) = registry
            .proxy_config("web-proxy", &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(reg.target_service_name, "web");
        assert_eq!(meta.last_index, idx);
    }

    #[tokio::test]
    async fn test_blocking_read_times_out_with_same_index() {
        let registry = MemoryRegistry::new();
        let idx = registry.register(registration("web-proxy"));

        let start = Instant::now();
        let opts = QueryOptions {
            wait_index: idx,
            wait_hash: None,
            wait_time: Duration::from_millis(100),
        };
        let (_, meta) = registry.proxy_config("web-proxy", &opts).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(meta.last_index, idx);
    }

    #[tokio::test]
    async fn test_blocking_read_wakes_on_write() {
        let registry = Arc::new(MemoryRegistry::new());
        let idx = registry.register(registration("web-proxy"));

        let writer = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut reg = registration("web-proxy");
            reg.target_service_name = "api".to_string();
            writer.register(reg);
        });

        let opts = QueryOptions {
            wait_index: idx,
            wait_hash: None,
            wait_time: Duration::from_secs(5),
        };
        let start = Instant::now();
        let (reg, meta) = registry.proxy_config("web-proxy", &opts).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(reg.target_service_name, "api");
        assert!(meta.last_index > idx);
    }

    #[test]
    fn test_every_write_bumps_index() {
        let registry = MemoryRegistry::new();
        let a = registry.register(registration("web-proxy"));
        let b = registry.touch();
        let c = registry.deregister("web-proxy");
        assert!(a < b && b < c);
    }
}

//! URL-keyed cache of forwarding handlers.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::proxy::forward::{Forwarder, ProxyError, ProxyHandler};
use crate::targets::ResolvedEndpoint;

/// Lazily built forwarding handlers, keyed by canonical URL.
///
/// Entries outlive snapshot replacement and are never evicted. Concurrent
/// misses for one URL build a single handler; lookups of unrelated URLs only
/// contend on a shared shard.
pub struct ProxyCache {
    forwarder: Forwarder,
    handlers: DashMap<String, Arc<ProxyHandler>>,
}

impl ProxyCache {
    pub fn new(forwarder: Forwarder) -> Self {
        Self {
            forwarder,
            handlers: DashMap::new(),
        }
    }

    /// Handler for `endpoint`, built on first use.
    pub fn get_or_create(&self, endpoint: &ResolvedEndpoint) -> Result<Arc<ProxyHandler>, ProxyError> {
        let url = endpoint.url();
        if let Some(handler) = self.handlers.get(&url) {
            return Ok(Arc::clone(handler.value()));
        }

        match self.handlers.entry(url) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let handler = Arc::new(self.forwarder.handler(endpoint)?);
                tracing::debug!(url = %handler.url(), "Created proxy handler");
                entry.insert(Arc::clone(&handler));
                Ok(handler)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn endpoint(host: &str) -> ResolvedEndpoint {
        ResolvedEndpoint {
            scheme: "http".to_string(),
            host: host.to_string(),
            path: "/metrics".to_string(),
        }
    }

    fn cache() -> ProxyCache {
        ProxyCache::new(Forwarder::new(Duration::from_secs(1)).unwrap())
    }

    #[tokio::test]
    async fn reuses_handler_for_same_url() {
        let cache = cache();
        let first = cache.get_or_create(&endpoint("a:9100")).unwrap();
        let second = cache.get_or_create(&endpoint("a:9100")).unwrap();
        let other = cache.get_or_create(&endpoint("b:9100")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_build_one_handler() {
        let cache = Arc::new(cache());
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_create(&endpoint("c:9100")).unwrap() })
            })
            .collect();

        let handlers = futures_util::future::join_all(tasks).await;
        let first = handlers[0].as_ref().unwrap();
        for handler in &handlers {
            assert!(Arc::ptr_eq(first, handler.as_ref().unwrap()));
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failed_build_is_not_cached() {
        let cache = cache();
        let bad = ResolvedEndpoint {
            scheme: "gopher".to_string(),
            host: "a:70".to_string(),
            path: "/".to_string(),
        };
        assert!(cache.get_or_create(&bad).is_err());
        assert!(cache.is_empty());
    }
}

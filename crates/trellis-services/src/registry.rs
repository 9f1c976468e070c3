//! Connection registry — client key → live connection.

use std::sync::Arc;

use dashmap::DashMap;

use crate::connection::Connection;

/// Shared between every stream handler, the push dispatcher and the debug surface.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing any connection registered under the same key.
    ///
    /// The replaced connection is returned but not signalled; its own handler
    /// notices its termination independently.
    pub fn add(&self, key: String, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let replaced = self.connections.insert(key.clone(), connection);
        if replaced.is_some() {
            tracing::debug!(client = %key, "replaced existing connection");
        }
        replaced
    }

    /// Remove `key` only if it still maps to this exact connection.
    ///
    /// A handler must never evict a newer connection that took over its key.
    pub fn remove(&self, key: &str, connection: &Arc<Connection>) -> bool {
        self.connections
            .remove_if(key, |_, current| Arc::ptr_eq(current, connection))
            .is_some()
    }

    /// Copy of every entry. No lock is held once this returns.
    pub fn snapshot(&self) -> Vec<(String, Arc<Connection>)> {
        self.connections
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Arc<Connection> {
        Connection::new(None).0
    }

    fn lookup(registry: &ConnectionRegistry, key: &str) -> Option<Arc<Connection>> {
        registry
            .snapshot()
            .into_iter()
            .find_map(|(k, c)| (k == key).then_some(c))
    }

    #[test]
    fn new_registry_creates_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn stale_remove_keeps_replacement() {
        let registry = ConnectionRegistry::new();
        let a = conn();
        let b = conn();

        assert!(registry.add("k".into(), a.clone()).is_none());
        let replaced = registry.add("k".into(), b.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &a));

        assert!(!registry.remove("k", &a));
        let current = lookup(&registry, "k").unwrap();
        assert!(Arc::ptr_eq(&current, &b));

        assert!(registry.remove("k", &b));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let a = conn();
        registry.add("k".into(), a.clone());
        assert!(registry.remove("k", &a));
        assert!(!registry.remove("k", &a));
        assert!(!registry.remove("missing", &a));
    }

    #[test]
    fn snapshot_is_detached_from_registry() {
        let registry = ConnectionRegistry::new();
        let a = conn();
        let b = conn();
        registry.add("a".into(), a.clone());
        registry.add("b".into(), b);

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);

        // Mutating while holding the copy must not deadlock or alter it.
        registry.remove("a", &a);
        registry.add("c".into(), conn());
        assert_eq!(snap.len(), 2);
        assert_eq!(registry.len(), 2);
        assert!(lookup(&registry, "a").is_none());
    }

    #[test]
    fn clones_share_state() {
        let registry = ConnectionRegistry::new();
        let other = registry.clone();
        registry.add("x".into(), conn());
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn concurrent_add_remove() {
        let registry = ConnectionRegistry::new();
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let c = conn();
                        let key = format!("{t}-{i}");
                        registry.add(key.clone(), c.clone());
                        let _ = registry.snapshot();
                        assert!(registry.remove(&key, &c));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}

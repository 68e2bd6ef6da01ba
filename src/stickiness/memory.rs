//! In-process stickiness store for a single balancer instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::load_balancer::ServerId;
use crate::stickiness::{StickinessStore, StoreError};

/// A session binding with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickyBinding {
    pub server_id: ServerId,
    pub expires_at: Instant,
}

impl StickyBinding {
    pub fn new(server_id: ServerId, ttl: Duration) -> Self {
        Self {
            server_id,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `DashMap`-backed store. Per-key operations are atomic through the map's
/// shard locks, so concurrent first requests agree on one binding.
#[derive(Debug, Clone, Default)]
pub struct MemoryStickinessStore {
    bindings: Arc<DashMap<String, StickyBinding>>,
}

impl MemoryStickinessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bindings, expired ones included.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every expired binding. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.bindings.retain(|_, binding| {
            let keep = !binding.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}

#[async_trait]
impl StickinessStore for MemoryStickinessStore {
    async fn get(&self, session_key: &str) -> Result<Option<ServerId>, StoreError> {
        let now = Instant::now();
        if let Some(binding) = self.bindings.get(session_key) {
            if !binding.is_expired(now) {
                return Ok(Some(binding.server_id.clone()));
            }
        }
        // The read guard is released above; removing while holding it deadlocks.
        self.bindings
            .remove_if(session_key, |_, binding| binding.is_expired(now));
        Ok(None)
    }

    async fn set(
        &self,
        session_key: &str,
        server_id: &ServerId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.bindings.insert(
            session_key.to_string(),
            StickyBinding::new(server_id.clone(), ttl),
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        session_key: &str,
        server_id: &ServerId,
        ttl: Duration,
    ) -> Result<ServerId, StoreError> {
        let now = Instant::now();
        match self.bindings.entry(session_key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(StickyBinding::new(server_id.clone(), ttl));
                    Ok(server_id.clone())
                } else {
                    Ok(entry.get().server_id.clone())
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(StickyBinding::new(server_id.clone(), ttl));
                Ok(server_id.clone())
            }
        }
    }

    async fn delete(&self, session_key: &str) -> Result<bool, StoreError> {
        Ok(self.bindings.remove(session_key).is_some())
    }

    async fn delete_if(&self, session_key: &str, server_id: &ServerId) -> Result<bool, StoreError> {
        Ok(self
            .bindings
            .remove_if(session_key, |_, binding| &binding.server_id == server_id)
            .is_some())
    }

    async fn delete_server(&self, server_id: &ServerId) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.bindings.retain(|_, binding| {
            let keep = &binding.server_id != server_id;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn get_set_delete() {
        let store = MemoryStickinessStore::new();
        let a = ServerId::from("a");

        assert_eq!(store.get("s1").await.unwrap(), None);
        store.set("s1", &a, TTL).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), Some(a.clone()));

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert_eq!(store.get("s1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_binding_is_absent() {
        let store = MemoryStickinessStore::new();
        store.set("s1", &"a".into(), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("s1").await.unwrap(), Some("a".into()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("s1").await.unwrap(), None);
        assert!(store.is_empty(), "lookup prunes the expired entry");
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_keeps_live_winner() {
        let store = MemoryStickinessStore::new();
        let a = ServerId::from("a");
        let b = ServerId::from("b");

        assert_eq!(store.set_if_absent("s1", &a, TTL).await.unwrap(), a);
        assert_eq!(store.set_if_absent("s1", &b, TTL).await.unwrap(), a);

        tokio::time::advance(TTL).await;
        assert_eq!(store.set_if_absent("s1", &b, TTL).await.unwrap(), b);
        assert_eq!(store.get("s1").await.unwrap(), Some(b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_first_requests_agree() {
        let store = MemoryStickinessStore::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let candidate = ServerId::new(format!("server-{}", i));
                    store.set_if_absent("brand-new", &candidate, TTL).await.unwrap()
                })
            })
            .collect();

        let mut winners = std::collections::HashSet::new();
        for handle in handles {
            winners.insert(handle.await.unwrap());
        }
        assert_eq!(winners.len(), 1);
        let bound = store.get("brand-new").await.unwrap().unwrap();
        assert!(winners.contains(&bound));
    }

    #[tokio::test]
    async fn delete_if_spares_a_rebound_session() {
        let store = MemoryStickinessStore::new();
        let a = ServerId::from("a");
        let b = ServerId::from("b");
        store.set("s1", &a, TTL).await.unwrap();

        // Rebound to b before the failure report for a arrives.
        store.set("s1", &b, TTL).await.unwrap();
        assert!(!store.delete_if("s1", &a).await.unwrap());
        assert_eq!(store.get("s1").await.unwrap(), Some(b.clone()));

        assert!(store.delete_if("s1", &b).await.unwrap());
        assert_eq!(store.get("s1").await.unwrap(), None);
        assert!(!store.delete_if("s1", &b).await.unwrap());
    }

    #[tokio::test]
    async fn delete_server_drops_only_its_bindings() {
        let store = MemoryStickinessStore::new();
        store.set("s1", &"a".into(), TTL).await.unwrap();
        store.set("s2", &"a".into(), TTL).await.unwrap();
        store.set("s3", &"b".into(), TTL).await.unwrap();

        assert_eq!(store.delete_server(&"a".into()).await.unwrap(), 2);
        assert_eq!(store.get("s1").await.unwrap(), None);
        assert_eq!(store.get("s3").await.unwrap(), Some("b".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let store = MemoryStickinessStore::new();
        store.set("short", &"a".into(), Duration::from_secs(1)).await.unwrap();
        store.set("long", &"a".into(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}

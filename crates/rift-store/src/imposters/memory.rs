use super::{store_inline_stubs, ImpostersRepository, ListenerHandle, ListenerRegistry};
use crate::error::StoreResult;
use crate::model::Imposter;
use crate::stubs::{InMemoryStubRepository, StubRepository};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Imposter repository that keeps everything in process memory
#[derive(Debug, Default)]
pub struct InMemoryImpostersRepository {
    /// Imposter configuration without stubs or requests
    imposters: RwLock<HashMap<u16, Imposter>>,
    /// One shared stub store per port, created on first use
    stubs: RwLock<HashMap<u16, Arc<InMemoryStubRepository>>>,
    listeners: ListenerRegistry,
}

impl InMemoryImpostersRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn stub_store(&self, port: u16) -> Arc<InMemoryStubRepository> {
        if let Some(store) = self.stubs.read().get(&port) {
            return Arc::clone(store);
        }
        Arc::clone(self.stubs.write().entry(port).or_default())
    }

    fn clear(&self) {
        self.listeners.shutdown_all();
        self.imposters.write().clear();
        self.stubs.write().clear();
    }
}

#[async_trait]
impl ImpostersRepository for InMemoryImpostersRepository {
    async fn add(&self, mut imposter: Imposter, listener: ListenerHandle) -> StoreResult<Imposter> {
        let port = imposter.port;
        let stubs = self.stub_store(port);
        store_inline_stubs(stubs.as_ref(), &mut imposter).await?;

        self.imposters.write().insert(port, imposter.clone());
        self.listeners.register(port, listener);
        info!("Imposter on port {} stored in memory", port);

        imposter.stubs = stubs.to_json().await?;
        Ok(imposter)
    }

    async fn get(&self, port: u16) -> StoreResult<Option<Imposter>> {
        let stored = self.imposters.read().get(&port).cloned();
        let Some(mut imposter) = stored else {
            return Ok(None);
        };
        let stubs = self.stub_store(port);
        imposter.stubs = stubs.to_json().await?;
        imposter.requests = stubs.load_requests().await?;
        Ok(Some(imposter))
    }

    fn ports(&self) -> Vec<u16> {
        self.listeners.ports()
    }

    fn exists(&self, port: u16) -> bool {
        self.listeners.contains(port)
    }

    async fn del(&self, port: u16) -> StoreResult<Option<Imposter>> {
        let imposter = self.get(port).await?;
        self.listeners.shutdown(port);
        self.imposters.write().remove(&port);
        self.stubs.write().remove(&port);
        if imposter.is_some() {
            info!("Imposter on port {} deleted", port);
        }
        Ok(imposter)
    }

    async fn delete_all(&self) -> StoreResult<()> {
        self.clear();
        Ok(())
    }

    fn delete_all_sync(&self) -> StoreResult<()> {
        self.clear();
        Ok(())
    }

    fn stubs_for(&self, port: u16) -> Arc<dyn StubRepository> {
        self.stub_store(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stub;
    use serde_json::json;

    fn imposter_with_stub(port: u16) -> Imposter {
        let mut imposter = Imposter::new(port, "http");
        imposter.stubs.push(Stub::new(vec![], vec![json!({"is": {"body": "hi"}})]));
        imposter
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let repo = InMemoryImpostersRepository::new();
        let stored = repo
            .add(imposter_with_stub(3000), ListenerHandle::detached())
            .await
            .unwrap();
        assert_eq!(stored.stubs.len(), 1);

        assert!(repo.exists(3000));
        let fetched = repo.get(3000).await.unwrap().unwrap();
        assert_eq!(fetched.stubs, stored.stubs);
        assert!(repo.get(3001).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stubs_added_before_imposter_are_kept() {
        let repo = InMemoryImpostersRepository::new();
        repo.stubs_for(3000)
            .add(Stub::new(vec![], vec![json!({"is": {"body": "early"}})]))
            .await
            .unwrap();

        let stored = repo
            .add(imposter_with_stub(3000), ListenerHandle::detached())
            .await
            .unwrap();
        assert_eq!(stored.stubs.len(), 2);
        assert_eq!(stored.stubs[0].responses[0]["is"]["body"], "early");
    }

    #[tokio::test]
    async fn test_stubs_for_shares_one_store() {
        let repo = InMemoryImpostersRepository::new();
        repo.add(Imposter::new(3000, "http"), ListenerHandle::detached())
            .await
            .unwrap();

        repo.stubs_for(3000).add(Stub::default()).await.unwrap();
        assert_eq!(repo.stubs_for(3000).count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inline_requests_are_dropped() {
        let repo = InMemoryImpostersRepository::new();
        let mut imposter = Imposter::new(3000, "http");
        imposter.requests.push(json!({"path": "/stale"}));

        let stored = repo.add(imposter, ListenerHandle::detached()).await.unwrap();
        assert!(stored.requests.is_empty());
    }

    #[tokio::test]
    async fn test_all_in_port_order() {
        let repo = InMemoryImpostersRepository::new();
        for port in [4000, 2000, 3000] {
            repo.add(Imposter::new(port, "tcp"), ListenerHandle::detached())
                .await
                .unwrap();
        }

        let ports: Vec<u16> = repo.all().await.unwrap().iter().map(|i| i.port).collect();
        assert_eq!(ports, vec![2000, 3000, 4000]);
    }

    #[tokio::test]
    async fn test_del_stops_listener_and_returns_state() {
        let repo = InMemoryImpostersRepository::new();
        let (handle, mut rx) = ListenerHandle::new();
        repo.add(imposter_with_stub(3000), handle).await.unwrap();

        let deleted = repo.del(3000).await.unwrap().unwrap();
        assert_eq!(deleted.port, 3000);
        assert!(rx.recv().await.is_ok());
        assert!(!repo.exists(3000));
        assert!(repo.get(3000).await.unwrap().is_none());
        assert_eq!(repo.stubs_for(3000).count().await.unwrap(), 0);

        assert!(repo.del(3000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let repo = InMemoryImpostersRepository::new();
        repo.add(Imposter::new(3000, "http"), ListenerHandle::detached())
            .await
            .unwrap();
        repo.add(Imposter::new(3001, "http"), ListenerHandle::detached())
            .await
            .unwrap();

        repo.delete_all().await.unwrap();
        assert!(repo.all().await.unwrap().is_empty());
        assert!(!repo.exists(3000));
    }
}

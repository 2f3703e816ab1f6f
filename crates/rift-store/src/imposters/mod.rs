//! Imposter repositories.
//!
//! An imposter repository stores imposter configuration and hands out the
//! stub repository of each imposter. It also keeps the stop handle of every
//! running listener, which only ever lives in memory.

mod filesystem;
mod memory;

pub use filesystem::FilesystemImpostersRepository;
pub use memory::InMemoryImpostersRepository;

use crate::error::StoreResult;
use crate::model::Imposter;
use crate::stubs::StubRepository;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Stop handle of a protocol listener
#[derive(Debug, Clone, Default)]
pub struct ListenerHandle {
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl ListenerHandle {
    /// Create a handle together with the receiver the listener should watch
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        (
            Self {
                shutdown_tx: Some(shutdown_tx),
            },
            shutdown_rx,
        )
    }

    /// Handle for an imposter whose listener is run elsewhere
    pub fn detached() -> Self {
        Self::default()
    }

    /// Signal the listener to stop
    pub fn stop(&self) {
        if let Some(ref tx) = self.shutdown_tx {
            let _ = tx.send(());
        }
    }
}

/// Listener handles by port, scoped to one repository instance
#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    handles: Mutex<HashMap<u16, ListenerHandle>>,
}

impl ListenerRegistry {
    pub fn register(&self, port: u16, handle: ListenerHandle) {
        if let Some(previous) = self.handles.lock().insert(port, handle) {
            previous.stop();
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.handles.lock().contains_key(&port)
    }

    /// Registered ports in ascending order
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.handles.lock().keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Stop and forget the listener on a port
    pub fn shutdown(&self, port: u16) {
        let handle = self.handles.lock().remove(&port);
        if let Some(handle) = handle {
            debug!("Stopping listener on port {}", port);
            handle.stop();
        }
    }

    pub fn shutdown_all(&self) {
        let handles: Vec<_> = self.handles.lock().drain().collect();
        for (port, handle) in handles {
            debug!("Stopping listener on port {}", port);
            handle.stop();
        }
    }
}

/// Storage of imposters and their stubs.
///
/// Both variants behave identically; only durability differs.
#[async_trait]
pub trait ImpostersRepository: Send + Sync {
    /// Persist an imposter and register its listener.
    ///
    /// Stubs already stored for the port are kept and the imposter's inline
    /// stubs are appended after them. Inline `requests` are dropped.
    async fn add(&self, imposter: Imposter, listener: ListenerHandle) -> StoreResult<Imposter>;

    /// Imposter with its materialized stubs and request log
    async fn get(&self, port: u16) -> StoreResult<Option<Imposter>>;

    /// Every registered imposter, in ascending port order
    async fn all(&self) -> StoreResult<Vec<Imposter>> {
        let mut imposters = Vec::new();
        for port in self.ports() {
            if let Some(imposter) = self.get(port).await? {
                imposters.push(imposter);
            }
        }
        Ok(imposters)
    }

    /// Registered ports in ascending order
    fn ports(&self) -> Vec<u16>;

    /// Whether a listener is registered on the port
    fn exists(&self, port: u16) -> bool;

    /// Stop the listener and remove all stored state, returning the last
    /// known imposter
    async fn del(&self, port: u16) -> StoreResult<Option<Imposter>>;

    /// Stop every listener and remove all stored state
    async fn delete_all(&self) -> StoreResult<()>;

    /// Blocking variant of `delete_all` for process shutdown
    fn delete_all_sync(&self) -> StoreResult<()>;

    /// Stub repository of an imposter; usable before `add`
    fn stubs_for(&self, port: u16) -> Arc<dyn StubRepository>;
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Filesystem { datadir: PathBuf },
}

impl StorageConfig {
    /// Filesystem when a data directory is configured, otherwise in-memory
    pub fn from_datadir(datadir: Option<PathBuf>) -> Self {
        match datadir {
            Some(datadir) => StorageConfig::Filesystem { datadir },
            None => StorageConfig::InMemory,
        }
    }
}

/// Create the imposter repository for a storage configuration
pub fn create_repository(config: &StorageConfig) -> Arc<dyn ImpostersRepository> {
    match config {
        StorageConfig::InMemory => Arc::new(InMemoryImpostersRepository::new()),
        StorageConfig::Filesystem { datadir } => {
            Arc::new(FilesystemImpostersRepository::new(datadir.clone()))
        }
    }
}

/// Append inline stubs after those already stored for the imposter
async fn store_inline_stubs(stubs: &dyn StubRepository, imposter: &mut Imposter) -> StoreResult<()> {
    for stub in std::mem::take(&mut imposter.stubs) {
        stubs.add(stub).await?;
    }
    imposter.requests.clear();
    Ok(())
}

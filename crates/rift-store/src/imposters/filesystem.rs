use super::{store_inline_stubs, ImpostersRepository, ListenerHandle, ListenerRegistry};
use crate::error::{StoreError, StoreResult};
use crate::fs::{self, ImposterHeader, HEADER_FILE};
use crate::model::Imposter;
use crate::stubs::{FilesystemStubRepository, StubRepository};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Imposter repository persisted under a data directory, one directory per
/// imposter port
#[derive(Debug)]
pub struct FilesystemImpostersRepository {
    datadir: PathBuf,
    listeners: ListenerRegistry,
}

impl FilesystemImpostersRepository {
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            listeners: ListenerRegistry::default(),
        }
    }

    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    fn imposter_dir(&self, port: u16) -> PathBuf {
        self.datadir.join(port.to_string())
    }

    fn stub_store(&self, port: u16) -> FilesystemStubRepository {
        FilesystemStubRepository::new(self.imposter_dir(port))
    }
}

/// Imposter fields stored in the header, everything but stubs and requests
fn header_fields(imposter: &Imposter, path: &Path) -> StoreResult<serde_json::Map<String, Value>> {
    let Value::Object(mut fields) =
        serde_json::to_value(imposter).map_err(|e| StoreError::json(path, e))?
    else {
        return Ok(serde_json::Map::new());
    };
    fields.remove("stubs");
    fields.remove("requests");
    Ok(fields)
}

#[async_trait]
impl ImpostersRepository for FilesystemImpostersRepository {
    async fn add(&self, mut imposter: Imposter, listener: ListenerHandle) -> StoreResult<Imposter> {
        let port = imposter.port;
        let dir = self.imposter_dir(port);
        let stubs = self.stub_store(port);
        store_inline_stubs(&stubs, &mut imposter).await?;

        // stubs may have been written before the imposter itself
        let mut header = ImposterHeader::load_or_default(&dir).await?;
        header.fields = header_fields(&imposter, &dir.join(HEADER_FILE))?;
        header.save(&dir).await?;

        self.listeners.register(port, listener);
        info!("Imposter on port {} stored in {:?}", port, dir);

        imposter.stubs = stubs.to_json().await?;
        Ok(imposter)
    }

    async fn get(&self, port: u16) -> StoreResult<Option<Imposter>> {
        let dir = self.imposter_dir(port);
        let header = match ImposterHeader::load(&dir).await? {
            Some(header) if header.has_imposter() => header,
            _ => return Ok(None),
        };

        let mut imposter: Imposter = serde_json::from_value(Value::Object(header.fields))
            .map_err(|e| StoreError::json(&dir.join(HEADER_FILE), e))?;
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
        if imposter.is_some() {
            fs::remove_path(&self.imposter_dir(port)).await?;
            info!("Imposter on port {} deleted", port);
        }
        Ok(imposter)
    }

    async fn delete_all(&self) -> StoreResult<()> {
        self.listeners.shutdown_all();
        fs::remove_path(&self.datadir).await
    }

    fn delete_all_sync(&self) -> StoreResult<()> {
        fs::remove_path_sync(&self.datadir)?;
        self.listeners.shutdown_all();
        Ok(())
    }

    fn stubs_for(&self, port: u16) -> Arc<dyn StubRepository> {
        Arc::new(self.stub_store(port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Stub;
    use serde_json::json;
    use tempfile::TempDir;

    fn imposter(port: u16) -> Imposter {
        let mut imposter = Imposter::new(port, "http");
        imposter
            .config
            .insert("name".to_string(), json!("orders"));
        imposter
            .config
            .insert("recordRequests".to_string(), json!(true));
        imposter.stubs.push(Stub::new(
            vec![json!({"equals": {"path": "/"}})],
            vec![json!({"is": {"body": "hi"}})],
        ));
        imposter
    }

    #[tokio::test]
    async fn test_add_writes_header() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemImpostersRepository::new(dir.path());
        repo.add(imposter(3000), ListenerHandle::detached())
            .await
            .unwrap();

        let header: Value = fs::read_json(&dir.path().join("3000/imposter.json"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(header["port"], 3000);
        assert_eq!(header["name"], "orders");
        assert_eq!(header["stubs"][0]["meta"]["dir"], "stubs/0");
        assert!(header.get("requests").is_none());
    }

    #[tokio::test]
    async fn test_get_materializes_stubs_and_requests() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemImpostersRepository::new(dir.path());
        repo.add(imposter(3000), ListenerHandle::detached())
            .await
            .unwrap();
        repo.stubs_for(3000)
            .add_request(json!({"path": "/"}))
            .await
            .unwrap();

        let fetched = repo.get(3000).await.unwrap().unwrap();
        assert_eq!(fetched.config.get("name"), Some(&json!("orders")));
        assert!(fetched.records_requests());
        assert_eq!(fetched.stubs[0].responses, vec![json!({"is": {"body": "hi"}})]);
        assert_eq!(fetched.requests, vec![json!({"path": "/"})]);
    }

    #[tokio::test]
    async fn test_get_without_header_is_none() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemImpostersRepository::new(dir.path());
        assert!(repo.get(3000).await.unwrap().is_none());

        // stubs stored ahead of the imposter do not make it exist
        repo.stubs_for(3000).add(Stub::default()).await.unwrap();
        assert!(repo.get(3000).await.unwrap().is_none());
        assert!(!repo.exists(3000));
    }

    #[tokio::test]
    async fn test_add_merges_existing_stubs() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemImpostersRepository::new(dir.path());
        repo.stubs_for(3000)
            .add(Stub::new(vec![], vec![json!({"is": {"body": "early"}})]))
            .await
            .unwrap();

        let stored = repo
            .add(imposter(3000), ListenerHandle::detached())
            .await
            .unwrap();
        assert_eq!(stored.stubs.len(), 2);
        assert_eq!(stored.stubs[0].responses[0]["is"]["body"], "early");
    }

    #[tokio::test]
    async fn test_state_survives_new_repository_instance() {
        let dir = TempDir::new().unwrap();
        {
            let repo = FilesystemImpostersRepository::new(dir.path());
            repo.add(imposter(3000), ListenerHandle::detached())
                .await
                .unwrap();
        }

        let reopened = FilesystemImpostersRepository::new(dir.path());
        assert!(!reopened.exists(3000));
        let fetched = reopened.get(3000).await.unwrap().unwrap();
        assert_eq!(fetched.stubs.len(), 1);
    }

    #[tokio::test]
    async fn test_del_removes_directory() {
        let dir = TempDir::new().unwrap();
        let repo = FilesystemImpostersRepository::new(dir.path());
        let (handle, mut rx) = ListenerHandle::new();
        repo.add(imposter(3000), handle).await.unwrap();

        let deleted = repo.del(3000).await.unwrap().unwrap();
        assert_eq!(deleted.stubs.len(), 1);
        assert!(rx.recv().await.is_ok());
        assert!(!dir.path().join("3000").exists());
        assert!(repo.del(3000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_and_delete_all() {
        let dir = TempDir::new().unwrap();
        let datadir = dir.path().join("mb");
        let repo = FilesystemImpostersRepository::new(&datadir);
        repo.add(imposter(3001), ListenerHandle::detached())
            .await
            .unwrap();
        repo.add(imposter(3000), ListenerHandle::detached())
            .await
            .unwrap();

        let ports: Vec<u16> = repo.all().await.unwrap().iter().map(|i| i.port).collect();
        assert_eq!(ports, vec![3000, 3001]);

        repo.delete_all().await.unwrap();
        assert!(!datadir.exists());
        assert!(repo.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_sync() {
        let dir = TempDir::new().unwrap();
        let datadir = dir.path().join("mb");
        let repo = FilesystemImpostersRepository::new(&datadir);
        repo.add(imposter(3000), ListenerHandle::detached())
            .await
            .unwrap();

        repo.delete_all_sync().unwrap();
        assert!(!datadir.exists());
        assert!(!repo.exists(3000));
    }
}

//! Durable stub repository, one directory per stub.
//!
//! The imposter header (`imposter.json`) indexes stubs in match order and
//! is rewritten by structural mutations. Each stub directory carries its own
//! `meta.json` with the response file list and the cycle position, so
//! serving or appending responses only rewrites that one file.

use super::{match_record, PredicateFilter, StubHandle, StubMatch, StubRepository};
use crate::error::{StoreError, StoreResult};
use crate::fs::{
    self, HeaderStub, ImposterHeader, StubMeta, MATCHES_DIR, META_FILE, REQUESTS_DIR,
    RESPONSES_DIR, STUBS_DIR,
};
use crate::model::{empty_response, repeat_count, Stub};
use crate::stubs::ResponseCycle;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stub repository scoped to one imposter directory
#[derive(Debug, Clone)]
pub struct FilesystemStubRepository {
    imposter_dir: PathBuf,
}

impl FilesystemStubRepository {
    pub fn new(imposter_dir: impl Into<PathBuf>) -> Self {
        Self {
            imposter_dir: imposter_dir.into(),
        }
    }

    pub fn imposter_dir(&self) -> &Path {
        &self.imposter_dir
    }

    /// Write a stub's directory and return its header entry
    async fn save_stub(&self, stub: &Stub) -> StoreResult<HeaderStub> {
        let stubs_dir = self.imposter_dir.join(STUBS_DIR);
        let name = fs::next_entry_name(&stubs_dir, "", "").await?;
        let relative_dir = format!("{STUBS_DIR}/{name}");
        let stub_dir = self.imposter_dir.join(&relative_dir);

        let response_files: Vec<String> = (0..stub.responses.len())
            .map(|i| format!("{RESPONSES_DIR}/{i}.json"))
            .collect();
        try_join_all(
            response_files
                .iter()
                .zip(&stub.responses)
                .map(|(file, response)| {
                    let path = stub_dir.join(file);
                    async move { fs::write_json(&path, response).await }
                }),
        )
        .await?;

        let meta = StubMeta {
            response_files,
            cycle: ResponseCycle::for_responses(&stub.responses),
        };
        fs::write_json(&stub_dir.join(META_FILE), &meta).await?;

        Ok(HeaderStub::new(stub, relative_dir))
    }

    /// Materialize one stub from its header entry and directory
    async fn load_stub(&self, entry: &HeaderStub) -> StoreResult<Stub> {
        let stub_dir = self.imposter_dir.join(&entry.meta.dir);
        let meta: StubMeta = fs::read_json(&stub_dir.join(META_FILE))
            .await?
            .unwrap_or_default();

        let responses = try_join_all(
            meta.response_files
                .iter()
                .map(|file| {
                    let path = stub_dir.join(file);
                    async move { fs::read_json::<Value>(&path).await }
                }),
        )
        .await?;

        let mut stub = entry.definition();
        stub.responses = responses.into_iter().flatten().collect();
        stub.matches = fs::read_json_dir(&stub_dir.join(MATCHES_DIR)).await?;
        Ok(stub)
    }
}

#[async_trait]
impl StubRepository for FilesystemStubRepository {
    async fn count(&self) -> StoreResult<usize> {
        Ok(ImposterHeader::load_or_default(&self.imposter_dir)
            .await?
            .stubs
            .len())
    }

    async fn first(&self, filter: PredicateFilter<'_>, start_index: usize) -> StoreResult<StubMatch> {
        let header = ImposterHeader::load_or_default(&self.imposter_dir).await?;
        let found = header
            .stubs
            .iter()
            .enumerate()
            .skip(start_index)
            .find(|(_, entry)| filter(entry.predicates.as_slice()));

        Ok(match found {
            Some((index, entry)) => {
                let handle = FilesystemStub {
                    stub_dir: self.imposter_dir.join(&entry.meta.dir),
                    definition: entry.definition(),
                };
                StubMatch::found(index, Box::new(handle))
            }
            None => StubMatch::not_found(),
        })
    }

    async fn insert_at_index(&self, stub: Stub, index: usize) -> StoreResult<()> {
        let mut header = ImposterHeader::load_or_default(&self.imposter_dir).await?;
        let entry = self.save_stub(&stub).await?;
        let index = index.min(header.stubs.len());
        debug!(
            "Inserting stub {} at index {} in {:?}",
            entry.meta.dir, index, self.imposter_dir
        );
        header.stubs.insert(index, entry);
        header.save(&self.imposter_dir).await
    }

    async fn overwrite_all(&self, stubs: Vec<Stub>) -> StoreResult<()> {
        let mut header = ImposterHeader::load_or_default(&self.imposter_dir).await?;
        fs::remove_path(&self.imposter_dir.join(STUBS_DIR)).await?;

        let mut entries = Vec::with_capacity(stubs.len());
        for stub in &stubs {
            // sequential: each stub directory id depends on the previous one
            entries.push(self.save_stub(stub).await?);
        }

        header.stubs = entries;
        header.save(&self.imposter_dir).await
    }

    async fn delete_at_index(&self, index: usize) -> StoreResult<()> {
        let mut header = ImposterHeader::load_or_default(&self.imposter_dir).await?;
        if index >= header.stubs.len() {
            return Err(StoreError::missing_stub(index));
        }
        let entry = header.stubs.remove(index);
        header.save(&self.imposter_dir).await?;

        debug!(
            "Deleted stub {} at index {} in {:?}",
            entry.meta.dir, index, self.imposter_dir
        );
        fs::remove_path(&self.imposter_dir.join(&entry.meta.dir)).await
    }

    async fn to_json(&self) -> StoreResult<Vec<Stub>> {
        let header = ImposterHeader::load_or_default(&self.imposter_dir).await?;
        try_join_all(header.stubs.iter().map(|entry| self.load_stub(entry))).await
    }

    async fn add_request(&self, request: Value) -> StoreResult<()> {
        let path = self
            .imposter_dir
            .join(REQUESTS_DIR)
            .join(fs::history_file_name());
        fs::write_json(&path, &request).await
    }

    async fn load_requests(&self) -> StoreResult<Vec<Value>> {
        fs::read_json_dir(&self.imposter_dir.join(REQUESTS_DIR)).await
    }

    async fn delete_saved_requests(&self) -> StoreResult<()> {
        fs::remove_path(&self.imposter_dir.join(REQUESTS_DIR)).await
    }
}

/// Handle bound to one stub directory
#[derive(Debug)]
struct FilesystemStub {
    stub_dir: PathBuf,
    definition: Stub,
}

impl FilesystemStub {
    fn meta_path(&self) -> PathBuf {
        self.stub_dir.join(META_FILE)
    }

    async fn load_meta(&self) -> StoreResult<StubMeta> {
        fs::read_json(&self.meta_path()).await?.ok_or_else(|| {
            StoreError::MissingResource(format!(
                "stub at {} no longer exists",
                self.stub_dir.display()
            ))
        })
    }
}

#[async_trait]
impl StubHandle for FilesystemStub {
    fn stub(&self) -> &Stub {
        &self.definition
    }

    async fn add_response(&self, response: Value) -> StoreResult<()> {
        let mut meta = self.load_meta().await?;

        let responses_dir = self.stub_dir.join(RESPONSES_DIR);
        let name = fs::next_entry_name(&responses_dir, "", ".json").await?;
        fs::write_json(&responses_dir.join(&name), &response).await?;

        meta.response_files.push(format!("{RESPONSES_DIR}/{name}"));
        meta.cycle
            .push(meta.response_files.len() - 1, repeat_count(&response));
        fs::write_json(&self.meta_path(), &meta).await
    }

    async fn next_response(&self) -> StoreResult<Value> {
        let mut meta = self.load_meta().await?;
        let Some(response_index) = meta.cycle.advance() else {
            return Ok(empty_response());
        };
        fs::write_json(&self.meta_path(), &meta).await?;

        let Some(file) = meta.response_files.get(response_index) else {
            return Ok(empty_response());
        };
        Ok(fs::read_json(&self.stub_dir.join(file))
            .await?
            .unwrap_or_else(empty_response))
    }

    async fn record_match(
        &self,
        request: Value,
        response: Value,
        response_config: Value,
        processing_time_ms: u64,
    ) -> StoreResult<()> {
        let record = match_record(request, response, response_config, processing_time_ms);
        let path = self
            .stub_dir
            .join(MATCHES_DIR)
            .join(fs::history_file_name());
        fs::write_json(&path, &record).await
    }
}

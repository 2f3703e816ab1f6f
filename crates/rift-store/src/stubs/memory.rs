//! In-memory stub repository.

use super::cycle::ResponseCycle;
use super::{match_record, StubHandle, StubMatch, StubRepository};
use crate::error::{StoreError, StoreResult};
use crate::model::{empty_response, repeat_count, Stub};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Runtime state of one stored stub
#[derive(Debug)]
struct StoredStub {
    stub: Stub,
    cycle: ResponseCycle,
}

impl StoredStub {
    fn new(mut stub: Stub) -> Self {
        stub.matches.clear();
        let cycle = ResponseCycle::for_responses(&stub.responses);
        Self { stub, cycle }
    }
}

/// Stub repository that keeps everything in process memory.
///
/// Each stub sits behind its own mutex so serving responses from different
/// stubs never contends; the list itself is behind a read/write lock that is
/// only held for the duration of a synchronous scan or splice.
#[derive(Default)]
pub struct InMemoryStubRepository {
    stubs: RwLock<Vec<Arc<Mutex<StoredStub>>>>,
    requests: Mutex<Vec<Value>>,
}

impl InMemoryStubRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for InMemoryStubRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStubRepository")
            .field("stubs", &self.stubs.read().len())
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

/// Handle bound to one in-memory stub
struct InMemoryStub {
    definition: Stub,
    state: Arc<Mutex<StoredStub>>,
}

impl fmt::Debug for InMemoryStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStub")
            .field("predicates", &self.definition.predicates)
            .finish()
    }
}

#[async_trait]
impl StubHandle for InMemoryStub {
    fn stub(&self) -> &Stub {
        &self.definition
    }

    async fn add_response(&self, response: Value) -> StoreResult<()> {
        let mut state = self.state.lock();
        let response_index = state.stub.responses.len();
        state.cycle.push(response_index, repeat_count(&response));
        state.stub.responses.push(response);
        Ok(())
    }

    async fn next_response(&self) -> StoreResult<Value> {
        let mut state = self.state.lock();
        let response = state
            .cycle
            .advance()
            .and_then(|index| state.stub.responses.get(index).cloned());
        Ok(response.unwrap_or_else(empty_response))
    }

    async fn record_match(
        &self,
        request: Value,
        response: Value,
        response_config: Value,
        processing_time_ms: u64,
    ) -> StoreResult<()> {
        let record = match_record(request, response, response_config, processing_time_ms);
        self.state.lock().stub.matches.push(record);
        Ok(())
    }
}

#[async_trait]
impl StubRepository for InMemoryStubRepository {
    async fn count(&self) -> StoreResult<usize> {
        Ok(self.stubs.read().len())
    }

    async fn first(
        &self,
        filter: super::PredicateFilter<'_>,
        start_index: usize,
    ) -> StoreResult<StubMatch> {
        let stubs = self.stubs.read();
        for (index, stored) in stubs.iter().enumerate().skip(start_index) {
            let definition = stored.lock().stub.definition_only();
            if filter(definition.predicates.as_slice()) {
                let handle = InMemoryStub {
                    definition,
                    state: Arc::clone(stored),
                };
                return Ok(StubMatch::found(index, Box::new(handle)));
            }
        }
        Ok(StubMatch::not_found())
    }

    async fn insert_at_index(&self, stub: Stub, index: usize) -> StoreResult<()> {
        let mut stubs = self.stubs.write();
        let index = index.min(stubs.len());
        stubs.insert(index, Arc::new(Mutex::new(StoredStub::new(stub))));
        Ok(())
    }

    async fn overwrite_all(&self, stubs: Vec<Stub>) -> StoreResult<()> {
        let replacement = stubs
            .into_iter()
            .map(|stub| Arc::new(Mutex::new(StoredStub::new(stub))))
            .collect();
        *self.stubs.write() = replacement;
        Ok(())
    }

    async fn overwrite_at_index(&self, stub: Stub, index: usize) -> StoreResult<()> {
        let mut stubs = self.stubs.write();
        let slot = stubs
            .get_mut(index)
            .ok_or_else(|| StoreError::missing_stub(index))?;
        *slot = Arc::new(Mutex::new(StoredStub::new(stub)));
        Ok(())
    }

    async fn delete_at_index(&self, index: usize) -> StoreResult<()> {
        let mut stubs = self.stubs.write();
        if index >= stubs.len() {
            return Err(StoreError::missing_stub(index));
        }
        stubs.remove(index);
        Ok(())
    }

    async fn to_json(&self) -> StoreResult<Vec<Stub>> {
        let stubs = self.stubs.read();
        Ok(stubs.iter().map(|stored| stored.lock().stub.clone()).collect())
    }

    async fn add_request(&self, request: Value) -> StoreResult<()> {
        self.requests.lock().push(request);
        Ok(())
    }

    async fn load_requests(&self) -> StoreResult<Vec<Value>> {
        Ok(self.requests.lock().clone())
    }

    async fn delete_saved_requests(&self) -> StoreResult<()> {
        self.requests.lock().clear();
        Ok(())
    }
}

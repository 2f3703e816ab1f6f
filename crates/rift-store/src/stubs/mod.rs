//! Stub storage for a single imposter.
//!
//! This module provides:
//! - `StubRepository`: the ordered stub list of one imposter plus its request log
//! - `StubHandle`: access to one matched stub and its response cycle
//! - `ResponseCycle`: the repeat-aware response sequencer both variants share
//!
//! Two implementations satisfy the same contract:
//! - `InMemoryStubRepository`: fast, lost on restart
//! - `FilesystemStubRepository`: durable, one directory per stub
//!
//! Callers above this boundary never need to know which one is active.

pub mod cycle;
mod filesystem;
mod memory;

pub use cycle::{HasRepeatBehavior, ResponseCycle, MAX_REPEAT};
pub use filesystem::FilesystemStubRepository;
pub use memory::InMemoryStubRepository;

use crate::error::StoreResult;
use crate::model::{empty_response, Stub};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Filter applied to a stub's predicate list by `first()`
pub type PredicateFilter<'a> = &'a (dyn Fn(&[Value]) -> bool + Send + Sync);

/// Access to one stub returned by `StubRepository::first`.
///
/// The handle stays bound to the stub it was created for even if other
/// stubs are inserted or deleted around it afterwards.
#[async_trait]
pub trait StubHandle: Send + Sync + fmt::Debug {
    /// The stub's predicates and author fields
    fn stub(&self) -> &Stub;

    /// Append a response, extending the cycle by its repeat count.
    /// The current cycle position is kept.
    async fn add_response(&self, response: Value) -> StoreResult<()>;

    /// Serve the next response and advance the cycle.
    ///
    /// Concurrent calls on the same stub race on the cycle position and may
    /// both serve the same response; calls must be serialized per stub for a
    /// strictly ordered sequence.
    async fn next_response(&self) -> StoreResult<Value>;

    /// Append a match record for debugging
    async fn record_match(
        &self,
        request: Value,
        response: Value,
        response_config: Value,
        processing_time_ms: u64,
    ) -> StoreResult<()>;
}

/// Result of `StubRepository::first`
#[derive(Debug)]
pub struct StubMatch {
    pub success: bool,
    /// Position of the matched stub, `None` when nothing matched
    pub index: Option<usize>,
    pub stub: Box<dyn StubHandle>,
}

impl StubMatch {
    pub(crate) fn found(index: usize, stub: Box<dyn StubHandle>) -> Self {
        Self {
            success: true,
            index: Some(index),
            stub,
        }
    }

    pub(crate) fn not_found() -> Self {
        Self {
            success: false,
            index: None,
            stub: Box::new(EmptyStub::default()),
        }
    }
}

/// Ordered stub list of one imposter.
///
/// Scan order is match priority: first inserted, first considered, unless
/// repositioned by an insert or overwrite.
#[async_trait]
pub trait StubRepository: Send + Sync {
    /// Number of stubs currently held
    async fn count(&self) -> StoreResult<usize>;

    /// First stub at or after `start_index` whose predicates satisfy `filter`
    async fn first(
        &self,
        filter: PredicateFilter<'_>,
        start_index: usize,
    ) -> StoreResult<StubMatch>;

    /// Append a stub at the end
    async fn add(&self, stub: Stub) -> StoreResult<()> {
        let len = self.count().await?;
        self.insert_at_index(stub, len).await
    }

    /// Insert a stub, shifting later stubs back. An index past the end
    /// appends.
    async fn insert_at_index(&self, stub: Stub, index: usize) -> StoreResult<()>;

    /// Replace the whole list, discarding all previous stubs and responses
    async fn overwrite_all(&self, stubs: Vec<Stub>) -> StoreResult<()>;

    /// Replace the stub at `index`. Its cycle position starts over.
    async fn overwrite_at_index(&self, stub: Stub, index: usize) -> StoreResult<()> {
        self.delete_at_index(index).await?;
        self.insert_at_index(stub, index).await
    }

    /// Remove the stub at `index`, failing with a missing resource error if
    /// there is none
    async fn delete_at_index(&self, index: usize) -> StoreResult<()>;

    /// Fully materialized copies of every stub
    async fn to_json(&self) -> StoreResult<Vec<Stub>>;

    /// Remove proxy-recorded responses, then any stub left without responses
    async fn delete_saved_proxy_responses(&self) -> StoreResult<()> {
        let stubs = self
            .to_json()
            .await?
            .into_iter()
            .filter_map(strip_recorded_responses)
            .collect();
        self.overwrite_all(stubs).await
    }

    /// Append a request to the imposter's request log
    async fn add_request(&self, request: Value) -> StoreResult<()>;

    /// Requests in arrival order
    async fn load_requests(&self) -> StoreResult<Vec<Value>>;

    /// Clear the request log
    async fn delete_saved_requests(&self) -> StoreResult<()>;
}

/// Drop proxy-recorded responses from a stub, or the whole stub if none
/// remain
pub(crate) fn strip_recorded_responses(mut stub: Stub) -> Option<Stub> {
    stub.responses
        .retain(|response| !crate::model::is_recorded_response(response));
    stub.matches.clear();
    if stub.responses.is_empty() {
        None
    } else {
        Some(stub)
    }
}

/// Handle over the synthetic stub returned when nothing matched.
///
/// Always serves the default empty response and ignores mutations.
#[derive(Debug)]
pub struct EmptyStub {
    stub: Stub,
}

impl Default for EmptyStub {
    fn default() -> Self {
        Self {
            stub: Stub::synthetic_empty(),
        }
    }
}

#[async_trait]
impl StubHandle for EmptyStub {
    fn stub(&self) -> &Stub {
        &self.stub
    }

    async fn add_response(&self, _response: Value) -> StoreResult<()> {
        Ok(())
    }

    async fn next_response(&self) -> StoreResult<Value> {
        Ok(empty_response())
    }

    async fn record_match(
        &self,
        _request: Value,
        _response: Value,
        _response_config: Value,
        _processing_time_ms: u64,
    ) -> StoreResult<()> {
        Ok(())
    }
}

/// Shape of a persisted match record
pub(crate) fn match_record(
    request: Value,
    response: Value,
    response_config: Value,
    processing_time_ms: u64,
) -> Value {
    serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "request": request,
        "response": response,
        "responseConfig": response_config,
        "processingTime": processing_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_stub_serves_default_response() {
        let stub = EmptyStub::default();
        stub.add_response(json!({"is": "ignored"})).await.unwrap();

        assert_eq!(stub.next_response().await.unwrap(), json!({"is": {}}));
        assert_eq!(stub.next_response().await.unwrap(), json!({"is": {}}));
        assert_eq!(stub.stub().responses, vec![json!({"is": {}})]);
    }

    #[test]
    fn test_strip_recorded_responses() {
        let mixed = Stub::new(
            vec![],
            vec![
                json!({"is": {"body": "authored"}}),
                json!({"is": {"body": "recorded", "_proxyResponseTime": 3}}),
            ],
        );
        let kept = strip_recorded_responses(mixed).unwrap();
        assert_eq!(kept.responses, vec![json!({"is": {"body": "authored"}})]);

        let recorded_only = Stub::new(
            vec![],
            vec![json!({"is": {"body": "recorded", "_proxyResponseTime": 3}})],
        );
        assert!(strip_recorded_responses(recorded_only).is_none());
    }
}

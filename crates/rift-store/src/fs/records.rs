//! Persisted record shapes.

use super::layout::{read_json, write_json};
use super::HEADER_FILE;
use crate::error::StoreResult;
use crate::model::Stub;
use crate::stubs::ResponseCycle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// `imposter.json`: imposter configuration plus the stub index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImposterHeader {
    #[serde(default)]
    pub stubs: Vec<HeaderStub>,
    /// port, protocol and every other imposter field
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ImposterHeader {
    /// Read the header of an imposter directory, `None` if not written yet
    pub async fn load(imposter_dir: &Path) -> StoreResult<Option<Self>> {
        read_json(&imposter_dir.join(HEADER_FILE)).await
    }

    /// Read the header, treating a missing one as empty
    pub async fn load_or_default(imposter_dir: &Path) -> StoreResult<Self> {
        Ok(Self::load(imposter_dir).await?.unwrap_or_default())
    }

    pub async fn save(&self, imposter_dir: &Path) -> StoreResult<()> {
        write_json(&imposter_dir.join(HEADER_FILE), self).await
    }

    /// Whether imposter fields have been written, as opposed to a header
    /// that only indexes stubs stored ahead of the imposter
    pub fn has_imposter(&self) -> bool {
        self.fields.contains_key("port")
    }
}

/// Where a stub's directory lives, relative to the imposter directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubLocation {
    pub dir: String,
}

/// One stub entry of the header: predicates, author fields and location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderStub {
    #[serde(default)]
    pub predicates: Vec<Value>,
    pub meta: StubLocation,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HeaderStub {
    pub fn new(stub: &Stub, dir: String) -> Self {
        Self {
            predicates: stub.predicates.clone(),
            meta: StubLocation { dir },
            extra: stub.extra.clone(),
        }
    }

    /// The stub definition without responses
    pub fn definition(&self) -> Stub {
        Stub {
            predicates: self.predicates.clone(),
            responses: Vec::new(),
            matches: Vec::new(),
            extra: self.extra.clone(),
        }
    }
}

/// `stubs/{n}/meta.json`: response files and cycling state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubMeta {
    /// Response file paths relative to the stub directory, in response order
    #[serde(default)]
    pub response_files: Vec<String>,
    #[serde(flatten)]
    pub cycle: ResponseCycle,
}

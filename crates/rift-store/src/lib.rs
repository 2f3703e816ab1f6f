//! Stub storage and response cycling for Mountebank-compatible imposters.
//!
//! Imposters and their stubs live behind two repository traits with an
//! in-memory and a filesystem-backed implementation each. The admin API,
//! the validator and the request resolver only ever see the traits.

// ===== Storage =====
pub mod error;
pub mod fs;
pub mod imposters;
pub mod model;
pub mod stubs;

// ===== Admin surface =====
pub mod admin_api;
pub mod config;
pub mod matcher;
pub mod resolver;
pub mod validation;

pub use error::{StoreError, StoreResult};
pub use imposters::{
    create_repository, FilesystemImpostersRepository, ImpostersRepository,
    InMemoryImpostersRepository, ListenerHandle, StorageConfig,
};
pub use model::{Imposter, Stub};
pub use stubs::{
    FilesystemStubRepository, InMemoryStubRepository, ResponseCycle, StubHandle, StubMatch,
    StubRepository,
};

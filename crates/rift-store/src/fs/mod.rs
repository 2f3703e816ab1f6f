//! On-disk layout of the durable store.
//!
//! ```text
//! {datadir}/{port}/imposter.json
//! {datadir}/{port}/stubs/{n}/meta.json
//! {datadir}/{port}/stubs/{n}/responses/{m}.json
//! {datadir}/{port}/stubs/{n}/matches/{timestamp}.json
//! {datadir}/{port}/requests/{timestamp}.json
//! ```

mod layout;
mod records;

pub use layout::{
    history_file_name, list_names, next_entry_name, next_id, read_json, read_json_dir,
    remove_path, remove_path_sync, write_json,
};
pub use records::{HeaderStub, ImposterHeader, StubLocation, StubMeta};

pub const HEADER_FILE: &str = "imposter.json";
pub const META_FILE: &str = "meta.json";
pub const STUBS_DIR: &str = "stubs";
pub const RESPONSES_DIR: &str = "responses";
pub const MATCHES_DIR: &str = "matches";
pub const REQUESTS_DIR: &str = "requests";

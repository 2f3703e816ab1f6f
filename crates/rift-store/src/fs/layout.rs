//! JSON file helpers and id allocation for the on-disk layout.
//!
//! Every write replaces the whole file after making sure the parent
//! directory exists. Reading a file or directory that does not exist yields
//! an empty result; any other I/O error or malformed JSON is returned.

use crate::error::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

static HISTORY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Read and parse a JSON file, `None` if it does not exist
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_slice(&contents)
        .map(Some)
        .map_err(|e| StoreError::json(path, e))
}

/// Write a value as pretty JSON, creating parent directories as needed
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Remove a file or a whole directory tree. Absent paths are fine.
pub async fn remove_path(path: &Path) -> StoreResult<()> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => {
            debug!("Removed {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Blocking variant of [`remove_path`] for process shutdown
pub fn remove_path_sync(path: &Path) -> StoreResult<()> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Names of the entries in a directory, sorted. Empty if it does not exist.
pub async fn list_names(dir: &Path) -> StoreResult<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::io(dir, e))?
    {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Parse every `.json` file of a directory, in file name order
pub async fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> StoreResult<Vec<T>> {
    let mut values = Vec::new();
    for name in list_names(dir).await? {
        if !name.ends_with(".json") {
            continue;
        }
        if let Some(value) = read_json(&dir.join(&name)).await? {
            values.push(value);
        }
    }
    Ok(values)
}

/// First run of ASCII digits in a name, if any
fn numeric_part(name: &str) -> Option<u64> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Allocate the next id among sibling names: one past the largest numeric
/// part, or 0 when no name carries one. Gaps left by deletions are not
/// reused. `None` once a sibling already holds `u64::MAX`.
pub fn next_id<'a>(existing: impl IntoIterator<Item = &'a str>) -> Option<u64> {
    match existing.into_iter().filter_map(numeric_part).max() {
        Some(max) => max.checked_add(1),
        None => Some(0),
    }
}

/// Allocate the next entry name in a directory (`{prefix}{id}{suffix}`)
pub async fn next_entry_name(dir: &Path, prefix: &str, suffix: &str) -> StoreResult<String> {
    let names = list_names(dir).await?;
    let id = next_id(names.iter().map(String::as_str)).ok_or_else(|| StoreError::IdsExhausted {
        path: dir.to_path_buf(),
    })?;
    let name = format!("{prefix}{id}{suffix}");
    debug!("Allocated {} in {:?}", name, dir);
    Ok(name)
}

/// File name for a history record (requests, matches).
///
/// `{epoch-millis}-{pid}-{sequence}.json`; lexical order follows arrival
/// order within one process.
pub fn history_file_name() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let sequence = HISTORY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{millis:013}-{}-{sequence:010}.json", std::process::id())
}

//! Error types for stub and imposter storage.

use std::path::{Path, PathBuf};

/// Errors surfaced by the stub store, the filesystem layout and the
/// imposter repositories.
///
/// A file that does not exist is never an error: readers treat it as an
/// empty state. Everything else propagates to the caller unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An operation addressed a stub index or imposter that does not exist
    #[error("{0}")]
    MissingResource(String),
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Every numeric entry name in a directory has been used
    #[error("no entry ids left in {}", path.display())]
    IdsExhausted { path: PathBuf },
}

impl StoreError {
    pub fn missing_stub(index: usize) -> Self {
        StoreError::MissingResource(format!("no stub at index {index}"))
    }

    pub fn missing_imposter(port: u16) -> Self {
        StoreError::MissingResource(format!("no imposter on port {port}"))
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error maps to a "not found" condition for callers
    pub fn is_missing_resource(&self) -> bool {
        matches!(self, StoreError::MissingResource(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stub_message() {
        let err = StoreError::missing_stub(3);
        assert!(err.is_missing_resource());
        assert_eq!(err.to_string(), "no stub at index 3");
    }

    #[test]
    fn test_io_error_is_not_missing_resource() {
        let err = StoreError::io(
            Path::new("/tmp/x.json"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_missing_resource());
        assert!(err.to_string().contains("/tmp/x.json"));
    }
}

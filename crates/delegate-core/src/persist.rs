//! Whole-file persistence helpers.
//!
//! State files are plain overwrites with no locking, so a reader can see a
//! half-written file. Loading therefore distinguishes *absent* from
//! *corrupt* from *unreadable*, and [`LoadResultExt::fail_open`] is the one
//! place where the latter two are deliberately folded into "absent".

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Why a state file could not be loaded
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file does not exist
    #[error("file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// The file exists but its content could not be parsed
    #[error("corrupt file {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },

    /// The file exists but could not be read
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Whether the file was simply missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}

/// Fail-open conversion for load results
pub trait LoadResultExt<T> {
    /// Treat a missing, corrupt, or unreadable file as absent.
    ///
    /// Missing files are silent; corrupt and unreadable ones are logged at
    /// debug level because a concurrent writer routinely causes them.
    fn fail_open(self) -> Option<T>;
}

impl<T> LoadResultExt<T> for Result<T, LoadError> {
    fn fail_open(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(LoadError::NotFound { .. }) => None,
            Err(e) => {
                tracing::debug!("Treating state file as absent: {}", e);
                None
            }
        }
    }
}

/// Read a file to a string
pub fn load_text(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            LoadError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// Read and parse a JSON file
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let content = load_text(path)?;
    serde_json::from_str(&content).map_err(|e| LoadError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Read a file holding a single integer
pub fn load_integer(path: &Path) -> Result<i64, LoadError> {
    let content = load_text(path)?;
    content.trim().parse().map_err(|_| LoadError::Corrupt {
        path: path.to_path_buf(),
        message: format!("expected an integer, got {:?}", content.trim()),
    })
}

/// Serialize `value` as pretty JSON and overwrite `path`
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {:?}", path))?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}

/// Overwrite `path` with plain text
pub fn save_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))
}

/// Delete `path`; a missing file is not an error
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_load_json_distinguishes_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");

        let missing = load_json::<Sample>(&path).unwrap_err();
        assert!(missing.is_not_found());

        std::fs::write(&path, "{\"value\": ").unwrap();
        let corrupt = load_json::<Sample>(&path).unwrap_err();
        assert!(matches!(corrupt, LoadError::Corrupt { .. }));

        save_json(&path, &Sample { value: 7 }).unwrap();
        assert_eq!(load_json::<Sample>(&path).unwrap(), Sample { value: 7 });
    }

    #[test]
    fn test_fail_open_maps_errors_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(load_json::<Sample>(&path).fail_open(), None);
        assert_eq!(
            load_json::<Sample>(&dir.path().join("missing.json")).fail_open(),
            None
        );
    }

    #[test]
    fn test_load_integer_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(load_integer(&path).unwrap(), 4242);

        std::fs::write(&path, "abc").unwrap();
        assert!(matches!(
            load_integer(&path),
            Err(LoadError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_remove_if_exists_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, "x").unwrap();

        remove_if_exists(&path).unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}

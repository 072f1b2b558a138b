//! Utility functions for Tally's file-backed stores.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TallyError};

/// Maximum file size that can be read into memory (10 MB).
///
/// Applies to explorations, statistics snapshots and answer logs. Answer
/// collections grow with every submission and are read without a cap.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Read a file into a string with a custom size limit.
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| TallyError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(TallyError::upstream(format!(
            "File {} is too large ({} bytes, max {} bytes)",
            path.display(),
            size,
            max_size
        )));
    }

    fs::read_to_string(path).map_err(|e| TallyError::storage(path, e))
}

/// Read and parse a JSON document, `None` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    read_json_with_limit(path, MAX_FILE_SIZE)
}

/// Read and parse a JSON document of any size.
pub fn read_json_unbounded<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    read_json_with_limit(path, u64::MAX)
}

fn read_json_with_limit<T: DeserializeOwned>(path: &Path, max_size: u64) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = read_to_string_with_limit(path, max_size)?;
    let value = serde_json::from_str(&content)
        .map_err(|e| TallyError::serde(format!("{}: {}", path.display(), e)))?;
    Ok(Some(value))
}

/// Write a JSON document atomically using temp file + rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.exists() {
        fs::create_dir_all(parent).map_err(|e| TallyError::storage(parent, e))?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let temp_path = temp_path_for(path);

    {
        let mut file =
            fs::File::create(&temp_path).map_err(|e| TallyError::storage(&temp_path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| TallyError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| TallyError::storage(&temp_path, e))?;
    }

    // Rename is atomic on POSIX
    fs::rename(&temp_path, path).map_err(|e| TallyError::storage(path, e))?;

    Ok(())
}

/// Hidden sibling used while a document is being written.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Escape an identifier so it can be used as a single path component.
///
/// ASCII letters, digits, `-` and `_` pass through; every other byte becomes
/// `%XX`. The empty string maps to `%`, which no escaped value can produce.
pub fn encode_component(value: &str) -> String {
    if value.is_empty() {
        return "%".to_string();
    }

    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// Version numbers of the `<n>.json` documents in `dir`, ascending.
pub fn list_versions(dir: &Path) -> Result<Vec<u32>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| TallyError::storage(dir, e))?;
    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TallyError::storage(dir, e))?;
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        if let Some(version) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        {
            versions.push(version);
        }
    }

    versions.sort_unstable();
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_to_string_with_limit_success() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("test.txt");
        fs::write(&path, "Hello, world!").unwrap();

        assert_eq!(
            read_to_string_with_limit(&path, MAX_FILE_SIZE).unwrap(),
            "Hello, world!"
        );
    }

    #[test]
    fn test_read_to_string_with_limit_exceeds() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("large.txt");
        fs::write(&path, [b'x'; 1000]).unwrap();

        let err = read_to_string_with_limit(&path, 500).unwrap_err().to_string();
        assert!(err.contains("too large"));
        assert!(err.contains("1000 bytes"));
    }

    #[test]
    fn test_read_json_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let value: Option<serde_json::Value> = read_json(&temp.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_read_json_unbounded_ignores_cap() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.json");
        let text = "x".repeat(MAX_FILE_SIZE as usize);
        fs::write(&path, serde_json::to_string(&text).unwrap()).unwrap();

        assert!(read_json::<String>(&path).is_err());
        assert_eq!(read_json_unbounded::<String>(&path).unwrap(), Some(text));
    }

    #[test]
    fn test_read_json_invalid_is_serde_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, "not json").unwrap();

        let result: Result<Option<serde_json::Value>> = read_json(&path);
        assert!(matches!(result, Err(TallyError::Serde { .. })));
    }

    #[test]
    fn test_write_json_atomic_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a").join("b").join("doc.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();

        let read: Option<Vec<u32>> = read_json(&path).unwrap();
        assert_eq!(read, Some(vec![1, 2, 3]));
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("Intro"), "Intro");
        assert_eq!(encode_component("State 2"), "State%202");
        assert_eq!(encode_component("../etc"), "%2E%2E%2Fetc");
        assert_eq!(encode_component("Equals(x)"), "Equals%28x%29");
        assert_eq!(encode_component(""), "%");
        assert_ne!(encode_component("%"), encode_component(""));
    }

    #[test]
    fn test_list_versions() {
        let temp = TempDir::new().unwrap();
        for name in ["3.json", "1.json", "10.json", "notes.txt", "draft.json"] {
            fs::write(temp.path().join(name), "{}").unwrap();
        }

        assert_eq!(list_versions(temp.path()).unwrap(), vec![1, 3, 10]);
        assert!(list_versions(&temp.path().join("missing"))
            .unwrap()
            .is_empty());
    }
}

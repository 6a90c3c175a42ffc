//! Snapshot files for the in-memory record stores.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::error::ReplResult;

/// Atomically write `records` to `path` (tmp file, fsync, rename).
pub fn write_snapshot<T: Serialize>(path: &Path, records: &[T]) -> ReplResult<()> {
    let encoded = bincode::serialize(records)?;

    let mut tmp_path = path.to_path_buf();
    tmp_path.set_extension("tmp");
    {
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(&encoded)?;
        tmp_file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read records written by [`write_snapshot`]; a missing or empty file yields none.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> ReplResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut contents = Vec::new();
    File::open(path)?.read_to_end(&mut contents)?;
    if contents.is_empty() {
        return Ok(Vec::new());
    }
    Ok(bincode::deserialize(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplError;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let records: Vec<String> = read_snapshot(&dir.path().join("none.bin")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_write_leaves_no_tmp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.bin");
        write_snapshot(&path, &["a".to_string(), "b".to_string()]).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("records.tmp").exists());
        let records: Vec<String> = read_snapshot(&path).unwrap();
        assert_eq!(records, vec!["a", "b"]);
    }

    #[test]
    fn test_corrupt_file_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.bin");
        std::fs::write(&path, [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]).unwrap();
        let result: ReplResult<Vec<String>> = read_snapshot(&path);
        assert!(matches!(result, Err(ReplError::Serialization(_))));
    }
}

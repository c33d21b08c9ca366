//! On-disk snapshots under `.ism/`: `ism.yaml`, `managed.yaml` and
//! `indices.yaml` are rewritten whole on every save.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `data`. The bytes go to a sibling temp file that is
/// renamed over the target, so readers see either the old snapshot or the
/// new one.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(data)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Seed a snapshot during `ism init`. Returns false when one is already
/// there, leaving it untouched.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

/// Serialize `value` as YAML and swap it in with [`atomic_write`].
pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_yaml::to_string(value)?;
    atomic_write(path, data.as_bytes())
}

/// Read a YAML snapshot, or `None` when the file does not exist.
pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    Ok(Some(serde_yaml::from_str(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn snapshot_lands_in_missing_data_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".ism/managed.yaml");
        atomic_write(&path, b"indices: {}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "indices: {}");
    }

    #[test]
    fn resave_replaces_whole_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("indices.yaml");
        atomic_write(&path, b"indices:\n  logs-1: {}\n").unwrap();
        atomic_write(&path, b"indices: {}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "indices: {}");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn init_keeps_existing_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ism.yaml");
        std::fs::write(&path, b"workers: 8\n").unwrap();
        assert!(!write_if_missing(&path, b"workers: 4\n").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "workers: 8\n");
    }

    #[test]
    fn yaml_snapshot_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("indices.yaml");
        assert!(load_yaml::<BTreeMap<String, u64>>(&path).unwrap().is_none());

        let docs: BTreeMap<String, u64> = [("logs-1".to_string(), 20)].into();
        save_yaml(&path, &docs).unwrap();
        assert_eq!(load_yaml(&path).unwrap(), Some(docs));
    }
}

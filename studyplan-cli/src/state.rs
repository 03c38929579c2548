use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use studyplan_core::KeyValueStore;
use tracing::warn;

pub fn studyplan_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".studyplan"))
}

pub fn ensure_studyplan_home() -> Result<PathBuf> {
    let dir = studyplan_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn cache_path() -> Result<PathBuf> {
    Ok(ensure_studyplan_home()?.join("cache.json"))
}

/// Key-value store backed by one JSON object on disk.
///
/// Every batch rewrites the whole file through a sibling temp file and a
/// rename, so a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open `path`, starting empty when it is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let s = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            match serde_json::from_str(&s) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(target: "studyplan::state", path = %path.display(), %err, "ignoring corrupt cache file");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put_batch(&mut self, batch: Vec<(String, String)>) -> Result<()> {
        let mut next = self.entries.clone();
        next.extend(batch);

        let json = serde_json::to_string_pretty(&next).context("serialize cache")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;

        self.entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        store
            .put_batch(vec![("a".into(), "1".into()), ("b".into(), "2".into())])
            .unwrap();
        store.put_batch(vec![("a".into(), "3".into())]).unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("3"));
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("2"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn test_failed_write_keeps_previous_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("cache.json");

        let mut store = FileStore::open(&path).unwrap();
        assert!(store.put_batch(vec![("a".into(), "1".into())]).is_err());
        assert_eq!(store.get("a").unwrap(), None);
    }
}

//! Local key-value cache persisted as one JSON object.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use keepsake_common::error::{KeepsakeError, KeepsakeResult};

/// Errors raised while reading or writing the cache file.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to access cache {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse cache {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<CacheError> for KeepsakeError {
    fn from(err: CacheError) -> Self {
        KeepsakeError::store(err.to_string())
    }
}

/// String keys mapped to string values (each usually a JSON document).
///
/// Every write is persisted immediately by writing a sibling temp file and
/// renaming it over the cache file.
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl LocalCache {
    /// Open the cache at `path`; a missing file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|source| CacheError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "Cache opened");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> KeepsakeResult<()> {
        self.entries.insert(key.into(), value.into());
        self.persist()
    }

    pub fn remove(&mut self, key: &str) -> KeepsakeResult<Option<String>> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Decode the value under `key`. Missing or malformed values read as the
    /// default; malformed ones are logged.
    pub fn get_json<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(raw) = self.get(key) else {
            return T::default();
        };
        match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring malformed cache entry");
                T::default()
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> KeepsakeResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw)
    }

    fn persist(&self) -> KeepsakeResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = LocalCache::open(&path).unwrap();
        assert!(cache.get("ellenPhotos").is_none());
        cache.set_json("ellenPhotos", &["a", "b"]).unwrap();
        cache.set("note", "x").unwrap();

        let reopened = LocalCache::open(&path).unwrap();
        let photos: Vec<String> = reopened.get_json("ellenPhotos");
        assert_eq!(photos, vec!["a", "b"]);
        assert_eq!(reopened.keys().collect::<Vec<_>>(), vec!["ellenPhotos", "note"]);
        assert!(!dir.path().join("nested").join("cache.json.tmp").exists());
    }

    #[test]
    fn test_malformed_entry_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = LocalCache::open(dir.path().join("cache.json")).unwrap();
        cache.set("ellenMessages", "{ nope").unwrap();
        let messages: Vec<String> = cache.get_json("ellenMessages");
        assert!(messages.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            LocalCache::open(&path),
            Err(CacheError::Parse { .. })
        ));
    }

    #[test]
    fn test_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = LocalCache::open(&path).unwrap();
        cache.set("k", "v").unwrap();
        assert_eq!(cache.remove("k").unwrap().as_deref(), Some("v"));
        assert_eq!(cache.remove("k").unwrap(), None);
        assert!(LocalCache::open(&path).unwrap().get("k").is_none());
    }
}

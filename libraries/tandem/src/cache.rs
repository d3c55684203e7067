//! Local cache stores: synchronous key/value storage scoped to one device.
//!
//! The cache survives reloads but is never shared between devices. It's the fallback for when the
//! remote store isn't configured or can't be reached.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path} is not a JSON object of strings: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode cache entries: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("browser storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value storage with synchronous reads and writes.
///
/// Methods take `&self` because caches are shared (behind an `Rc`) by every collection manager.
pub trait LocalCache {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// A cache that lives only as long as the process does.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// A cache backed by a single JSON object file (`{"key": "value", ...}`).
///
/// The whole file is read once when opened. Every write rewrites the file: first to a sibling
/// temp file, then renamed over the original, so a crash mid-write leaves the old file intact.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    entries: RefCell<BTreeMap<String, String>>,
}

impl FileCache {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let entries = match std::fs::read(&path) {
            Ok(bytes) => parse_entries(&path, &bytes).unwrap_or_else(|e| {
                // a corrupt cache is a cache miss, not a fatal error
                log::error!("Discarding unreadable local cache: {e}");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        log::info!(
            "Opened local cache at {} ({} entries)",
            path.display(),
            entries.len()
        );

        Ok(Self {
            path,
            entries: RefCell::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, bytes).map_err(io_error)?;
        std::fs::rename(&tmp_path, &self.path).map_err(io_error)?;
        Ok(())
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.borrow_mut();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.borrow_mut();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Parses the contents of a [`FileCache`] file.
pub fn parse_entries(path: &Path, bytes: &[u8]) -> Result<BTreeMap<String, String>, CacheError> {
    serde_json::from_slice(bytes).map_err(|source| CacheError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// `window.localStorage`, scoped to the page's origin.
#[cfg(target_arch = "wasm32")]
pub struct BrowserStorage {
    storage: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl BrowserStorage {
    pub fn new() -> Result<Self, CacheError> {
        let window = web_sys::window()
            .ok_or_else(|| CacheError::Unavailable("no window".to_string()))?;
        let storage = window
            .local_storage()
            .map_err(|e| CacheError::Unavailable(format!("{e:?}")))?
            .ok_or_else(|| CacheError::Unavailable("localStorage is disabled".to_string()))?;
        Ok(Self { storage })
    }
}

#[cfg(target_arch = "wasm32")]
impl LocalCache for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.storage
            .get_item(key)
            .inspect_err(|e| log::error!("Error reading {key} from localStorage: {e:?}"))
            .ok()
            .flatten()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.storage
            .set_item(key, value)
            .map_err(|e| CacheError::Unavailable(format!("{e:?}")))
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.storage
            .remove_item(key)
            .map_err(|e| CacheError::Unavailable(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_cache_set_get_remove() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a"), None);

        cache.set("a", "1").unwrap();
        cache.set("b", "2").unwrap();
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);

        cache.remove("a").unwrap();
        assert_eq!(cache.get("a"), None);
        // removing a missing key is fine
        cache.remove("a").unwrap();
    }

    #[test]
    fn file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        {
            let cache = FileCache::open(&path).unwrap();
            cache.set("keywest-user", "Alex").unwrap();
            cache.set("keywest-itinerary-version", "3").unwrap();
            cache.remove("keywest-itinerary-version").unwrap();
        }

        let reopened = FileCache::open(&path).unwrap();
        assert_eq!(reopened.get("keywest-user").as_deref(), Some("Alex"));
        assert_eq!(reopened.get("keywest-itinerary-version"), None);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_cache_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{ this is not json").unwrap();

        let cache = FileCache::open(&path).unwrap();
        assert_eq!(cache.get("anything"), None);

        // the next write replaces the corrupt file
        cache.set("k", "v").unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let entries = parse_entries(&path, &bytes).unwrap();
        assert_eq!(entries.get("k").map(String::as_str), Some("v"));
    }
}

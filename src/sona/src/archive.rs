//! Archive read boundary
//!
//! Game files live in containers keyed by path. Parsing the packed container
//! format is out of scope here: [`DirectoryArchive`] reads containers that
//! were already unpacked to a directory, and anything else plugs in through
//! [`ArchiveReader`].

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Raw file payload, shared between cache and callers
pub type Payload = Arc<Vec<u8>>;

/// Trait for reading files out of a game container
pub trait ArchiveReader: Send + Sync {
    /// Read `keys` from `container`
    ///
    /// The output has one slot per key, in input order. A key that is not in
    /// the container is `None`, not an error.
    fn extract(&self, container: &Path, keys: &[&str]) -> io::Result<Vec<Option<Payload>>>;

    /// Whether the container exists at all
    fn exists(&self, container: &Path) -> bool;
}

/// Normalize an archive key: lowercase, forward slashes, no leading slash
pub fn normalize_key(key: &str) -> String {
    key.replace('\\', "/")
        .trim_start_matches('/')
        .to_lowercase()
}

/// Normalized key -> file on disk, for one container
type KeyIndex = HashMap<String, PathBuf>;

/// Containers unpacked to directories on disk
///
/// Unpackers do not always lowercase. A key with no exact file is looked up
/// in a normalized index of the container, built by one walk on first use.
#[derive(Default)]
pub struct DirectoryArchive {
    indexes: Mutex<HashMap<PathBuf, Arc<KeyIndex>>>,
}

impl DirectoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_index(container: &Path) -> KeyIndex {
        let mut index = KeyIndex::new();
        for entry in walkdir::WalkDir::new(container)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(container) else {
                continue;
            };
            index
                .entry(normalize_key(&relative.to_string_lossy()))
                .or_insert_with(|| entry.path().to_path_buf());
        }
        index
    }

    fn index(&self, container: &Path) -> io::Result<Arc<KeyIndex>> {
        let poisoned = || io::Error::new(io::ErrorKind::Other, "archive index poisoned");
        if let Some(index) = self.indexes.lock().map_err(|_| poisoned())?.get(container) {
            return Ok(Arc::clone(index));
        }

        // Walk without holding the lock; a racing walk of the same container
        // yields the same index
        let built = Arc::new(Self::build_index(container));
        let mut indexes = self.indexes.lock().map_err(|_| poisoned())?;
        Ok(Arc::clone(
            indexes.entry(container.to_path_buf()).or_insert(built),
        ))
    }

    fn read_one(&self, container: &Path, key: &str) -> io::Result<Option<Vec<u8>>> {
        let key = normalize_key(key);

        let direct = container.join(&key);
        if direct.is_file() {
            return std::fs::read(&direct).map(Some);
        }

        match self.index(container)?.get(&key) {
            Some(path) => std::fs::read(path).map(Some),
            None => Ok(None),
        }
    }

    /// Number of containers indexed so far
    pub fn indexed(&self) -> usize {
        self.indexes.lock().map(|m| m.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for DirectoryArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryArchive")
            .field("indexed", &self.indexed())
            .finish()
    }
}

impl ArchiveReader for DirectoryArchive {
    fn extract(&self, container: &Path, keys: &[&str]) -> io::Result<Vec<Option<Payload>>> {
        if !container.is_dir() {
            return Ok(vec![None; keys.len()]);
        }
        keys.iter()
            .map(|key| Ok(self.read_one(container, key)?.map(Arc::new)))
            .collect()
    }

    fn exists(&self, container: &Path) -> bool {
        container.is_dir()
    }
}

/// Read-through cache over another reader, keyed by (container, key)
///
/// Entries are never invalidated: game data is immutable for one pass.
/// Misses (`None`) are cached as well.
pub struct CachedArchive<A> {
    inner: A,
    entries: Mutex<HashMap<(PathBuf, String), Option<Payload>>>,
}

impl<A: ArchiveReader> CachedArchive<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A> std::fmt::Debug for CachedArchive<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedArchive").finish_non_exhaustive()
    }
}

impl<A: ArchiveReader> ArchiveReader for CachedArchive<A> {
    fn extract(&self, container: &Path, keys: &[&str]) -> io::Result<Vec<Option<Payload>>> {
        let normalized: Vec<String> = keys.iter().map(|k| normalize_key(k)).collect();

        let mut results: Vec<Option<Option<Payload>>> = {
            let entries = self
                .entries
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "archive cache poisoned"))?;
            normalized
                .iter()
                .map(|k| entries.get(&(container.to_path_buf(), k.clone())).cloned())
                .collect()
        };

        let missing: Vec<usize> = (0..keys.len()).filter(|&i| results[i].is_none()).collect();
        if !missing.is_empty() {
            let miss_keys: Vec<&str> = missing.iter().map(|&i| keys[i]).collect();
            let fetched = self.inner.extract(container, &miss_keys)?;

            let mut entries = self
                .entries
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "archive cache poisoned"))?;
            for (&i, payload) in missing.iter().zip(fetched) {
                entries.insert(
                    (container.to_path_buf(), normalized[i].clone()),
                    payload.clone(),
                );
                results[i] = Some(payload);
            }
        }

        Ok(results.into_iter().map(Option::flatten).collect())
    }

    fn exists(&self, container: &Path) -> bool {
        self.inner.exists(container)
    }
}

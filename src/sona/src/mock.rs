//! In-memory collaborators for tests

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sona_bank::{BankDecoder, DecodeError, EventTable, SampleMap};

use crate::archive::{normalize_key, ArchiveReader, Payload};

/// Archive backed by a map of (container, key) -> bytes
#[derive(Default)]
pub struct MemoryArchive {
    files: HashMap<(PathBuf, String), Payload>,
    containers: HashSet<PathBuf>,
    broken: HashSet<String>,
    reads: AtomicUsize,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an (initially empty) container
    pub fn add_container<P: AsRef<Path>>(&mut self, container: P) {
        self.containers.insert(container.as_ref().to_path_buf());
    }

    pub fn insert<P: AsRef<Path>>(&mut self, container: P, key: &str, data: Vec<u8>) {
        let container = container.as_ref().to_path_buf();
        self.containers.insert(container.clone());
        self.files
            .insert((container, normalize_key(key)), Arc::new(data));
    }

    /// Make any read that includes `key` fail with an I/O error
    pub fn fail_on(&mut self, key: &str) {
        self.broken.insert(normalize_key(key));
    }

    /// Number of keys requested from this archive so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl ArchiveReader for MemoryArchive {
    fn extract(&self, container: &Path, keys: &[&str]) -> io::Result<Vec<Option<Payload>>> {
        self.reads.fetch_add(keys.len(), Ordering::SeqCst);
        if let Some(key) = keys.iter().find(|k| self.broken.contains(&normalize_key(k))) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("corrupt entry {}", key),
            ));
        }
        Ok(keys
            .iter()
            .map(|k| {
                self.files
                    .get(&(container.to_path_buf(), normalize_key(k)))
                    .cloned()
            })
            .collect())
    }

    fn exists(&self, container: &Path) -> bool {
        self.containers.contains(container)
    }
}

/// Decoder that recognizes payloads by exact content
///
/// Events payloads decode to their table and are rejected as sample
/// containers; sample payloads the other way round. Anything else is
/// malformed.
#[derive(Default)]
pub struct MockDecoder {
    events: HashMap<Vec<u8>, EventTable>,
    samples: HashMap<Vec<u8>, SampleMap>,
    events_calls: AtomicUsize,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, payload: &[u8], events: &[(&str, u32)]) -> Self {
        let table = events
            .iter()
            .map(|(name, hash)| (name.to_string(), *hash))
            .collect();
        self.events.insert(payload.to_vec(), table);
        self
    }

    pub fn with_samples(mut self, payload: &[u8], samples: &[(u32, u32)]) -> Self {
        self.samples
            .insert(payload.to_vec(), samples.iter().copied().collect());
        self
    }

    pub fn events_calls(&self) -> usize {
        self.events_calls.load(Ordering::SeqCst)
    }
}

impl BankDecoder for MockDecoder {
    fn decode_events(&self, path: &str, bytes: &[u8]) -> sona_bank::Result<EventTable> {
        self.events_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(table) = self.events.get(bytes) {
            return Ok(table.clone());
        }
        if self.samples.contains_key(bytes) {
            return Err(DecodeError::WrongShape {
                expected: "sound bank",
                found: "wwise pack",
            });
        }
        Err(DecodeError::Malformed(format!("{}: unrecognized payload", path)))
    }

    fn decode_samples(
        &self,
        path: &str,
        table: &EventTable,
        bytes: &[u8],
    ) -> sona_bank::Result<SampleMap> {
        if let Some(samples) = self.samples.get(bytes) {
            let wanted: HashSet<u32> = table.iter().map(|e| e.hash).collect();
            return Ok(samples
                .iter()
                .filter(|(hash, _)| wanted.contains(hash))
                .map(|(h, s)| (*h, *s))
                .collect());
        }
        if self.events.contains_key(bytes) {
            return Err(DecodeError::WrongShape {
                expected: "wwise pack",
                found: "sound bank",
            });
        }
        Err(DecodeError::Malformed(format!("{}: unrecognized payload", path)))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

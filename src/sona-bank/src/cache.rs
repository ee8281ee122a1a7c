//! Read-through cache for decoded event tables
//!
//! Game data does not change during an extraction pass, so a decoded table
//! is kept for the lifetime of the process. Skins that share a bank decode
//! it once. Wrong-shape verdicts are cached too; other failures are not, so
//! a transient decompiler error is retried the next time the path comes up.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{BankDecoder, DecodeError, EventTable, Result, SampleMap};

#[derive(Clone)]
enum Cached {
    Table(EventTable),
    WrongShape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Wraps a [`BankDecoder`] and memoizes `decode_events` by container path
pub struct CachedDecoder<D> {
    inner: D,
    events: Mutex<HashMap<String, Cached>>,
}

impl<D: BankDecoder> CachedDecoder<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            events: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached event-table entries
    pub fn len(&self) -> usize {
        self.events.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, path: &str) -> Option<Cached> {
        self.events.lock().ok()?.get(path).cloned()
    }

    fn store(&self, path: &str, entry: Cached) {
        if let Ok(mut map) = self.events.lock() {
            map.insert(path.to_string(), entry);
        }
    }
}

impl<D> std::fmt::Debug for CachedDecoder<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDecoder").finish_non_exhaustive()
    }
}

impl<D: BankDecoder> BankDecoder for CachedDecoder<D> {
    fn decode_events(&self, path: &str, bytes: &[u8]) -> Result<EventTable> {
        match self.lookup(path) {
            Some(Cached::Table(table)) => return Ok(table),
            Some(Cached::WrongShape { expected, found }) => {
                return Err(DecodeError::WrongShape { expected, found })
            }
            None => {}
        }

        match self.inner.decode_events(path, bytes) {
            Ok(table) => {
                self.store(path, Cached::Table(table.clone()));
                Ok(table)
            }
            Err(DecodeError::WrongShape { expected, found }) => {
                self.store(path, Cached::WrongShape { expected, found });
                Err(DecodeError::WrongShape { expected, found })
            }
            Err(e) => Err(e),
        }
    }

    fn decode_samples(&self, path: &str, table: &EventTable, bytes: &[u8]) -> Result<SampleMap> {
        self.inner.decode_samples(path, table, bytes)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

//! Sound bank decode boundary for sona
//!
//! Audio for a sub-entity ships as a bank-path-group: one events container
//! (a compiled sound bank) plus zero or more sample containers. Decoding
//! those formats is delegated to an external decompiler; this crate defines
//! the seam the resolver talks to and the typed failures it branches on.
//!
//! # Format Overview
//!
//! ## Sound bank (`BKHD`)
//!
//! Compiled event hierarchy, optionally with embedded media:
//! - Bytes 0-3: "BKHD" magic
//! - Bytes 4-7: Section size
//! - Remaining: sections (HIRC, DIDX, DATA, ...)
//!
//! ## Wwise pack (`r3d2`)
//!
//! Flat container of encoded samples keyed by media id:
//! - Bytes 0-3: "r3d2" magic
//! - Bytes 4-7: Version
//! - Bytes 8-11: Entry count
//! - Remaining: offset table and sample payloads

mod cache;
mod exec;
mod payload;

pub use cache::CachedDecoder;
pub use exec::{ExecCommand, ExecDecompiler};
pub use payload::PayloadKind;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Magic bytes for a compiled sound bank: "BKHD"
pub const SOUNDBANK_MAGIC: [u8; 4] = *b"BKHD";

/// Magic bytes for a sample pack: "r3d2"
pub const WWISE_PACK_MAGIC: [u8; 4] = *b"r3d2";

/// Errors from bank decoding
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    /// The payload is a valid container, just not the one this call expects
    #[error("Wrong payload shape: expected {expected}, got {found}")]
    WrongShape {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Malformed bank: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decompiler error: {0}")]
    Exec(String),

    #[error("Decompiler timed out after {0:?}")]
    Timeout(Duration),
}

impl DecodeError {
    /// True when the payload parsed as a different container type.
    ///
    /// The resolver swaps the events/sample roles of a group on this signal.
    pub fn is_wrong_shape(&self) -> bool {
        matches!(self, DecodeError::WrongShape { .. })
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Internal media hash -> sample id
pub type SampleMap = HashMap<u32, u32>;

/// One symbolic event and the internal hash the bank stores it under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub name: String,
    pub hash: u32,
}

/// Events declared by a compiled sound bank, in bank order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTable {
    entries: Vec<EventEntry>,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, hash: u32) {
        self.entries.push(EventEntry {
            name: name.into(),
            hash,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventEntry> {
        self.entries.iter()
    }

    /// Keep only events whose symbolic name is in `known`
    pub fn filtered(&self, known: &HashSet<String>) -> EventTable {
        EventTable {
            entries: self
                .entries
                .iter()
                .filter(|e| known.contains(&e.name))
                .cloned()
                .collect(),
        }
    }
}

impl FromIterator<(String, u32)> for EventTable {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        EventTable {
            entries: iter
                .into_iter()
                .map(|(name, hash)| EventEntry { name, hash })
                .collect(),
        }
    }
}

/// Trait for decoding bank payloads
///
/// `path` is the container path the payload was read from. Backends use it
/// for diagnostics and as a cache key; it never changes how bytes decode.
pub trait BankDecoder: Send + Sync {
    /// Decode the event table of a compiled sound bank
    ///
    /// Returns [`DecodeError::WrongShape`] when the payload is a sample
    /// container rather than an events bank.
    fn decode_events(&self, path: &str, bytes: &[u8]) -> Result<EventTable>;

    /// Resolve event hashes to sample ids within one sample container
    fn decode_samples(&self, path: &str, table: &EventTable, bytes: &[u8]) -> Result<SampleMap>;

    /// Get the backend name for diagnostics
    fn name(&self) -> &'static str;
}

impl<D: BankDecoder + ?Sized> BankDecoder for Box<D> {
    fn decode_events(&self, path: &str, bytes: &[u8]) -> Result<EventTable> {
        (**self).decode_events(path, bytes)
    }

    fn decode_samples(&self, path: &str, table: &EventTable, bytes: &[u8]) -> Result<SampleMap> {
        (**self).decode_samples(path, table, bytes)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

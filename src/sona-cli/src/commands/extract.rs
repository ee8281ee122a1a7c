//! Extract command: write ownership artifacts and copy owned bank files

use anyhow::Result;
use sona::{BankDecoder, DecodeError, EventTable, Task};
use sona_bank::SampleMap;

use crate::config::Settings;

/// Stand-in decoder for runs that never decode banks
struct NoDecoder;

impl BankDecoder for NoDecoder {
    fn decode_events(&self, path: &str, _bytes: &[u8]) -> sona_bank::Result<EventTable> {
        Err(DecodeError::Exec(format!("no decompiler configured for {}", path)))
    }

    fn decode_samples(
        &self,
        path: &str,
        _table: &EventTable,
        _bytes: &[u8],
    ) -> sona_bank::Result<SampleMap> {
        Err(DecodeError::Exec(format!("no decompiler configured for {}", path)))
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

pub fn handle(settings: &Settings) -> Result<()> {
    super::run::execute(settings, Task::Extract, &NoDecoder)?;
    Ok(())
}

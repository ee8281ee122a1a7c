//! Mapping command: resolve event names to sample ids

use anyhow::Result;
use sona::Task;
use sona_bank::{CachedDecoder, ExecDecompiler};
use tracing::info;

use crate::config::Settings;

pub fn handle(settings: &Settings) -> Result<()> {
    let command = settings.require_decompiler()?;
    let decoder = CachedDecoder::new(
        ExecDecompiler::new(command).with_timeout(settings.decompiler_timeout),
    );

    let summary = super::run::execute(settings, Task::Mapping, &decoder)?;
    info!(
        decoded = decoder.len(),
        failed_groups = summary.groups_failed,
        "mapping finished"
    );
    Ok(())
}

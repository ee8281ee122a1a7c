//! Command dispatch functions
//!
//! Resolves effective settings for each processing command before handing off.

use anyhow::Result;
use std::path::Path;

use crate::cli::RunArgs;
use crate::commands;
use crate::commands::configure::ConfigUpdate;
use crate::config::{Config, Settings};

fn settings(run: &RunArgs) -> Result<Settings> {
    Config::load()?.resolve(run)
}

/// Dispatch the metadata command
pub fn dispatch_metadata(source: &Path, run: &RunArgs) -> Result<()> {
    commands::metadata::handle(source, &settings(run)?)
}

/// Dispatch the extract command
pub fn dispatch_extract(run: &RunArgs) -> Result<()> {
    commands::extract::handle(&settings(run)?)
}

/// Dispatch the mapping command
pub fn dispatch_mapping(run: &RunArgs) -> Result<()> {
    commands::mapping::handle(&settings(run)?)
}

/// Dispatch the configure command
pub fn dispatch_configure(update: ConfigUpdate, show: bool) -> Result<()> {
    commands::configure::handle(update, show)
}

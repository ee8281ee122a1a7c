//! Metadata command: build and save the entity catalog

use anyhow::{Context, Result};
use sona::{catalog, Catalog, CatalogSource, OutputWriter};
use std::path::Path;
use tracing::info;

use crate::config::Settings;

/// Build the catalog from `source` and write `<out>/catalog.json`
///
/// Catalog errors (bad skin ids, missing version) abort the command.
pub fn handle(source: &Path, settings: &Settings) -> Result<()> {
    let game_root = settings.require_game_root()?;

    let mut raw = CatalogSource::load_dir(source)
        .with_context(|| format!("Failed to load catalog sources from {}", source.display()))?;
    if !settings.languages.is_empty() {
        raw.languages = settings.languages.clone();
    }

    let mut catalog = catalog::build(&raw, game_root).context("Failed to build catalog")?;
    if !settings.ids.is_empty() {
        catalog.entities.retain(|e| settings.ids.contains(&e.id));
    }

    let writer = OutputWriter::new(&settings.output_dir, &catalog);
    let path = writer.write_catalog(&catalog)?;

    print_summary(&catalog);
    info!(path = %path.display(), "catalog written");
    println!("Catalog written to {}", path.display());
    Ok(())
}

fn print_summary(catalog: &Catalog) {
    let sub_entities: usize = catalog.entities.iter().map(|e| e.sub_entities.len()).sum();
    let missing_root = catalog.entities.iter().filter(|e| !e.root.present).count();
    println!("Game version: {}", catalog.game_version);
    println!("Languages: {}", catalog.languages.join(","));
    println!(
        "Entities: {} ({} sub-entities, {} without root container)",
        catalog.entities.len(),
        sub_entities,
        missing_root
    );
}

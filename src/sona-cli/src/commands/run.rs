//! Shared driver for the per-entity commands

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use sona::{
    BankDecoder, CachedArchive, Catalog, DirectoryArchive, EntityOutcome,
    JsonSceneParser, OutputWriter, Pipeline, RunSummary, Task,
};
use sona_bank::ExecCommand;

use crate::config::Settings;

/// Load `<out>/catalog.json` written by the metadata command
pub fn load_catalog(settings: &Settings) -> Result<Catalog> {
    let path = settings.output_dir.join("catalog.json");
    if !path.exists() {
        bail!(
            "No catalog at {}. Run `sona metadata` first",
            path.display()
        );
    }
    Catalog::load(&path).with_context(|| format!("Failed to load catalog {}", path.display()))
}

fn progress_bar(len: usize, enabled: bool) -> Result<ProgressBar> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn scene_parser(settings: &Settings) -> JsonSceneParser {
    match &settings.scene_converter {
        Some(cmd) => JsonSceneParser::with_converter(
            ExecCommand::new(cmd.clone()).with_timeout(settings.decompiler_timeout),
        ),
        None => JsonSceneParser::new(),
    }
}

/// Run `task` over the selected entities and print the summary
pub fn execute(settings: &Settings, task: Task, decoder: &dyn BankDecoder) -> Result<RunSummary> {
    let catalog = load_catalog(settings)?;
    let options = settings.run_options(&catalog);
    let entities = catalog.select(&options.ids);
    if entities.is_empty() {
        bail!("No entities match the id filter");
    }

    let archive = CachedArchive::new(DirectoryArchive::new());
    let scenes = scene_parser(settings);
    let writer = OutputWriter::new(&settings.output_dir, &catalog);
    let pipeline = Pipeline::new(&archive, &scenes, decoder, &writer, &options);

    let pb = progress_bar(entities.len(), settings.progress)?;
    let (outcomes, summary) = pipeline.run(&entities, task, |outcome: &EntityOutcome| {
        pb.set_message(outcome.alias.clone());
        pb.inc(1);
    })?;
    pb.finish_with_message("Done");

    tracing::debug!(cached = archive.len(), "archive cache entries");
    report(&outcomes, &summary);
    Ok(summary)
}

fn report(outcomes: &[EntityOutcome], summary: &RunSummary) {
    for outcome in outcomes {
        if let Err(e) = &outcome.result {
            eprintln!("Failed {} ({}): {}", outcome.alias, outcome.entity_id, e);
        }
    }
    println!("{}", summary);
}

//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up sona defaults.

use crate::config::Config;
use anyhow::Result;
use std::path::PathBuf;

/// Values the configure command can set
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub game_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub languages: Option<Vec<String>>,
    pub decompiler: Option<String>,
    pub decompiler_timeout: Option<u64>,
    pub scene_converter: Option<String>,
    pub workers: Option<usize>,
}

impl ConfigUpdate {
    fn is_empty(&self) -> bool {
        self.game_root.is_none()
            && self.output_dir.is_none()
            && self.languages.is_none()
            && self.decompiler.is_none()
            && self.decompiler_timeout.is_none()
            && self.scene_converter.is_none()
            && self.workers.is_none()
    }

    /// Apply to `config`, returning a line per changed value
    fn apply(self, config: &mut Config) -> Vec<String> {
        let mut changed = Vec::new();
        if let Some(root) = self.game_root {
            changed.push(format!("Game root: {}", root.display()));
            config.game_root = Some(root);
        }
        if let Some(dir) = self.output_dir {
            changed.push(format!("Output directory: {}", dir.display()));
            config.output_dir = Some(dir);
        }
        if let Some(languages) = self.languages {
            changed.push(format!("Languages: {}", languages.join(",")));
            config.languages = languages;
        }
        if let Some(cmd) = self.decompiler {
            changed.push(format!("Decompiler: {}", cmd));
            config.decompiler = Some(cmd);
        }
        if let Some(secs) = self.decompiler_timeout {
            changed.push(format!("Decompiler timeout: {}s", secs));
            config.decompiler_timeout_secs = Some(secs);
        }
        if let Some(cmd) = self.scene_converter {
            changed.push(format!("Scene converter: {}", cmd));
            config.scene_converter = Some(cmd);
        }
        if let Some(workers) = self.workers {
            changed.push(format!("Workers: {}", workers));
            config.workers = Some(workers);
        }
        changed
    }
}

/// Handle the configure command
pub fn handle(update: ConfigUpdate, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if update.is_empty() {
        show_usage();
        return Ok(());
    }

    for line in update.apply(&mut config) {
        println!("{}", line);
    }
    config.save()?;
    if let Ok(path) = Config::config_path() {
        println!("Config saved to: {}", path.display());
    }

    Ok(())
}

fn show_value(label: &str, value: Option<String>) {
    match value {
        Some(v) => println!("{}: {}", label, v),
        None => println!("{}: (not set)", label),
    }
}

/// Display current configuration
fn show_config(config: &Config) {
    show_value(
        "Game root",
        config.game_root.as_ref().map(|p| p.display().to_string()),
    );
    show_value(
        "Output directory",
        config.output_dir.as_ref().map(|p| p.display().to_string()),
    );
    show_value(
        "Languages",
        (!config.languages.is_empty()).then(|| config.languages.join(",")),
    );
    show_value("Decompiler", config.decompiler.clone());
    show_value(
        "Decompiler timeout",
        config.decompiler_timeout_secs.map(|s| format!("{}s", s)),
    );
    show_value("Scene converter", config.scene_converter.clone());
    show_value("Workers", config.workers.map(|w| w.to_string()));

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: sona configure --game-root PATH --output-dir PATH");
    println!("       sona configure --decompiler 'wwiser-cli' --decompiler-timeout 60");
    println!("   or: sona configure --show");
}

//! Configuration management for sona CLI

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sona::{Catalog, ClassifierRules};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::RunArgs;

const DEFAULT_DECOMPILER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub game_root: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Preference order for localized (voice) containers
    pub languages: Vec<String>,
    /// Bank decompiler command
    pub decompiler: Option<String>,
    pub decompiler_timeout_secs: Option<u64>,
    /// Scene-to-JSON converter command, for binary scene resources
    pub scene_converter: Option<String>,
    pub workers: Option<usize>,
    /// Category label markers
    pub categories: ClassifierRules,
}

/// Effective settings after merging flags, environment and config file
#[derive(Debug, Clone)]
pub struct Settings {
    pub game_root: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Empty unless set by flag or config; the catalog's languages apply then
    pub languages: Vec<String>,
    pub workers: usize,
    pub ids: Vec<u32>,
    pub decompiler: Option<String>,
    pub decompiler_timeout: Duration,
    pub scene_converter: Option<String>,
    pub rules: ClassifierRules,
    pub progress: bool,
}

impl Settings {
    /// Game root, required by commands that probe containers
    pub fn require_game_root(&self) -> Result<&Path> {
        match &self.game_root {
            Some(root) => Ok(root.as_path()),
            None => bail!(
                "Game root not set. Use --game-root, SONA_GAME_ROOT, or `sona configure --game-root`"
            ),
        }
    }

    pub fn require_decompiler(&self) -> Result<&str> {
        match &self.decompiler {
            Some(cmd) => Ok(cmd.as_str()),
            None => bail!(
                "Bank decompiler not set. Use --decompiler or `sona configure --decompiler`"
            ),
        }
    }

    pub fn run_options(&self, catalog: &Catalog) -> sona::RunOptions {
        let languages = if self.languages.is_empty() {
            catalog.languages.clone()
        } else {
            self.languages.clone()
        };
        sona::RunOptions {
            workers: self.workers,
            languages,
            ids: self.ids.clone(),
            rules: self.rules.clone(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("sona");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory at {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Merge command-line flags over the config file
    ///
    /// A missing output directory is a configuration error.
    pub fn resolve(&self, args: &RunArgs) -> Result<Settings> {
        let output_dir = match args.output.clone().or_else(|| self.output_dir.clone()) {
            Some(dir) => dir,
            None => bail!(
                "Output directory not set. Use --output, SONA_OUTPUT, or `sona configure --output-dir`"
            ),
        };

        let languages = if args.languages.is_empty() {
            self.languages.clone()
        } else {
            args.languages.clone()
        };

        let workers = args
            .workers
            .or(self.workers)
            .unwrap_or_else(|| sona::RunOptions::default().workers);
        if workers == 0 {
            bail!("Worker count must be at least 1");
        }

        Ok(Settings {
            game_root: args.game_root.clone().or_else(|| self.game_root.clone()),
            output_dir,
            languages,
            workers,
            ids: args.ids.clone(),
            decompiler: args.decompiler.clone().or_else(|| self.decompiler.clone()),
            decompiler_timeout: Duration::from_secs(
                self.decompiler_timeout_secs
                    .unwrap_or(DEFAULT_DECOMPILER_TIMEOUT_SECS),
            ),
            scene_converter: self.scene_converter.clone(),
            rules: self.categories.clone(),
            progress: !args.no_progress,
        })
    }
}

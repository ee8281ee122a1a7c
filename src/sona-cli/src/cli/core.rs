//! Core CLI definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sona")]
#[command(about = "Game audio bank extraction and event-to-sample mapping", long_about = None)]
pub struct Cli {
    /// Verbose logging (same as RUST_LOG=sona=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every processing command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Game install root (contains Game/DATA/FINAL)
    #[arg(long, env = "SONA_GAME_ROOT")]
    pub game_root: Option<PathBuf>,

    /// Output directory for catalog, artifacts and audio
    #[arg(short, long, env = "SONA_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Only process these entity ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<u32>,

    /// Number of worker threads
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Languages in preference order (comma separated, e.g. en_US,ko_KR)
    #[arg(long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// Bank decompiler command (overrides config)
    #[arg(long)]
    pub decompiler: Option<String>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the entity catalog from raw summary and detail records
    #[command(visible_alias = "m")]
    Metadata {
        /// Directory with meta.json, <lang>/champion-summary.json, champions/*.json
        source: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Extract owned bank files and write ownership artifacts
    #[command(visible_alias = "x")]
    Extract {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Resolve event names to sample ids and write mapping artifacts
    #[command(visible_alias = "map")]
    Mapping {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Set default game root
        #[arg(long)]
        game_root: Option<PathBuf>,

        /// Set default output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Set default languages (comma separated)
        #[arg(long, value_delimiter = ',')]
        languages: Option<Vec<String>>,

        /// Set bank decompiler command
        #[arg(long)]
        decompiler: Option<String>,

        /// Set decompiler timeout in seconds
        #[arg(long)]
        decompiler_timeout: Option<u64>,

        /// Set scene-to-JSON converter command
        #[arg(long)]
        scene_converter: Option<String>,

        /// Set default worker count
        #[arg(long)]
        workers: Option<usize>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mapping_flags() {
        let cli = Cli::try_parse_from([
            "sona", "-v", "mapping", "--ids", "1,11", "-j", "4", "-o", "out", "--languages",
            "ko_KR,en_US",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Mapping { run } => {
                assert_eq!(run.ids, vec![1, 11]);
                assert_eq!(run.workers, Some(4));
                assert_eq!(run.output, Some(PathBuf::from("out")));
                assert_eq!(run.languages, vec!["ko_KR", "en_US"]);
            }
            _ => panic!("expected mapping"),
        }
    }

    #[test]
    fn test_parse_metadata_source() {
        let cli = Cli::try_parse_from(["sona", "metadata", "raw", "--game-root", "/games/lol"])
            .unwrap();
        match cli.command {
            Commands::Metadata { source, run } => {
                assert_eq!(source, PathBuf::from("raw"));
                assert_eq!(run.game_root, Some(PathBuf::from("/games/lol")));
            }
            _ => panic!("expected metadata"),
        }
    }
}

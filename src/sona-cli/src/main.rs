mod cli;
mod commands;
mod config;
mod dispatch;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::*;
use commands::configure::ConfigUpdate;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "sona=debug,sona_bank=debug"
    } else {
        "sona=info,sona_bank=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Metadata { source, run } => dispatch::dispatch_metadata(&source, &run)?,

        Commands::Extract { run } => dispatch::dispatch_extract(&run)?,

        Commands::Mapping { run } => dispatch::dispatch_mapping(&run)?,

        Commands::Configure {
            game_root,
            output_dir,
            languages,
            decompiler,
            decompiler_timeout,
            scene_converter,
            workers,
            show,
        } => {
            let update = ConfigUpdate {
                game_root,
                output_dir,
                languages,
                decompiler,
                decompiler_timeout,
                scene_converter,
                workers,
            };
            dispatch::dispatch_configure(update, show)?;
        }
    }

    Ok(())
}

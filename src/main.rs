//! sfdprog - SFDP-driven SPI NOR flash loader host tool
//!
//! Drives the loader core against the in-memory emulator the way a
//! debugger host drives a target-side flash loader:
//!
//! - `decode` - decode a raw SFDP dump and print what the loader would use
//! - `program` - init, erase, write, verify and sign off through the
//!   host call interface

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::{Cli, Commands};
use sfdprog_core::config::LoaderConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match &cli.config {
        Some(path) => {
            let config = LoaderConfig::from_toml_file(path).map_err(error::CliError::from)?;
            log::info!("Loaded configuration from {:?}", path);
            config
        }
        None => LoaderConfig::default(),
    };

    match cli.command {
        Commands::Decode { dump, jedec_id } => commands::decode::run(&dump, jedec_id),
        Commands::Program {
            image,
            sfdp,
            jedec_id,
            address,
            erase_chip,
            no_verify,
            output,
        } => commands::program::run(
            &config,
            &commands::program::ProgramArgs {
                image,
                sfdp,
                jedec_id,
                address,
                erase_chip,
                verify: !no_verify,
                output,
            },
        ),
    }
}

//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
pub fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "sfdprog")]
#[command(author, version, about = "SFDP-driven SPI NOR flash loader", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Loader configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a raw SFDP dump and print the device descriptor
    Decode {
        /// SFDP dump (the chip's SFDP address space starting at 0)
        dump: PathBuf,

        /// JEDEC ID reported alongside the dump (hex, e.g. 0xEF4018)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0xEF4018")]
        jedec_id: u32,
    },

    /// Program an image into an emulated chip through the host interface
    Program {
        /// Image to program
        image: PathBuf,

        /// SFDP dump describing the emulated chip (default: 16 MiB JESD216B part)
        #[arg(long)]
        sfdp: Option<PathBuf>,

        /// JEDEC ID of the emulated chip (hex)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0xEF4018")]
        jedec_id: u32,

        /// Host address to program at (default: configured base address)
        #[arg(long, value_parser = parse_hex_u32)]
        address: Option<u32>,

        /// Erase the whole chip during init instead of per sector
        #[arg(long)]
        erase_chip: bool,

        /// Skip read-back verification
        #[arg(long)]
        no_verify: bool,

        /// Dump the emulated flash contents to this file afterwards
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x60000000"), Ok(0x6000_0000));
        assert_eq!(parse_hex_u32("0XEF4018"), Ok(0xEF4018));
        assert_eq!(parse_hex_u32("4096"), Ok(4096));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert!(parse_hex_u32("").is_err());
    }

    #[test]
    fn test_program_args() {
        let cli = Cli::parse_from([
            "sfdprog",
            "-vv",
            "program",
            "fw.bin",
            "--address",
            "0x60001000",
            "--erase-chip",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Program {
                address,
                erase_chip,
                no_verify,
                jedec_id,
                ..
            } => {
                assert_eq!(address, Some(0x6000_1000));
                assert!(erase_chip);
                assert!(!no_verify);
                assert_eq!(jedec_id, 0xEF4018);
            }
            _ => panic!("expected program"),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

//! Command-line interface definitions for sc16-sim.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sc16_core::log::LogLevel;

/// Exercise the SC16IS7x2 driver against the chip model.
#[derive(Parser)]
#[command(name = "sc16-sim", version, about)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// TOML file with `[chip]` and `[line]` sections. Defaults apply when omitted.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Most verbose driver log level written to stderr.
    #[arg(long, short = 'l', global = true, default_value = "info", value_parser = parse_level)]
    pub log_level: LogLevel,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Send a payload from channel A to channel B over a crosslinked model.
    Loopback(LoopbackArgs),
    /// Print the register values a line configuration translates to.
    Translate(TranslateArgs),
}

/// Arguments for the `loopback` subcommand.
#[derive(Parser)]
pub struct LoopbackArgs {
    /// Text to transmit.
    #[arg(long, short = 'p', default_value = "The quick brown fox jumps over the lazy dog")]
    pub payload: String,

    /// Number of times the payload is sent.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub repeat: usize,

    /// Bytes queued per write; keeps the peer's receive FIFO from overflowing.
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub chunk: u16,

    /// Largest block transfer the bus adapter accepts.
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u16).range(1..))]
    pub max_block: u16,

    /// Print the register transaction log after the run.
    #[arg(long)]
    pub dump_bus: bool,
}

/// Arguments for the `translate` subcommand.
#[derive(Parser)]
pub struct TranslateArgs {
    /// Override the configured baud rate.
    #[arg(long, short = 'b')]
    pub baud: Option<u32>,
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level `{s}`"))
}

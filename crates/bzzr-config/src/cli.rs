//! Command-line argument parsing for the bzzr host.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// bzzr host command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "bzzr", about = "Buzzer host client")]
pub struct CliArgs {
    /// Event server address.
    #[arg(long)]
    pub server: Option<String>,

    /// Event server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Owner-thread ticks per second.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Dump a room diagnostics snapshot every N seconds.
    #[arg(long)]
    pub inspect: Option<u32>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(rate) = args.tick_rate {
            self.host.tick_rate_hz = rate;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(secs) = args.inspect {
            self.host.diagnostics_interval_seconds = secs;
        }
    }
}

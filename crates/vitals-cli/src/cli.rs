//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "vitals")]
#[command(author, version, about = "CLI for radar vital-sign sensors", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, env = "RADAR_VITALS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Advertised-name substring identifying sensors (case-insensitive)
    #[arg(long, global = true)]
    pub name_filter: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby sensors
    Scan {
        /// Scan window in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Connect to a sensor and stream vitals until interrupted
    Watch {
        /// Device identifier (MAC address or UUID); scans when omitted
        #[arg(short, long, env = "RADAR_VITALS_DEVICE")]
        device: Option<String>,

        /// Stop after this many snapshots (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u64,

        /// Connection timeout in seconds
        #[arg(long)]
        connect_timeout: Option<u64>,
    },

    /// Print the config file location and effective settings
    Config {
        /// Store a default device for `watch` in the config file
        #[arg(long)]
        set_device: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from([
            "vitals", "watch", "--device", "AA:BB", "-n", "5", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Watch { device, count, .. } => {
                assert_eq!(device.as_deref(), Some("AA:BB"));
                assert_eq!(count, 5);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_parse_config_set_device() {
        let cli = Cli::try_parse_from(["vitals", "config", "--set-device", "AA:BB"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config { set_device: Some(ref d) } if d == "AA:BB"
        ));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["vitals", "-q", "-v", "scan"]).is_err());
    }
}

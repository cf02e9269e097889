use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::dates::DateNormalizer;

#[derive(Debug, Parser)]
#[command(name = "tourocc")]
#[command(about = "Guide and vehicle occupation tracking with conflict checks", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Expand legacy range occupations from a JSON file into the store.
    Migrate {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    #[arg(long, env = "TOUROCC_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "TOUROCC_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "TOUROCC_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Prometheus exporter port; disabled when unset.
    #[arg(long, env = "TOUROCC_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// WAL appends per agency before the log is compacted.
    #[arg(long, env = "TOUROCC_COMPACT_THRESHOLD", default_value_t = 1000)]
    pub compact_threshold: u64,

    /// Pin the civil calendar to a fixed UTC offset instead of the host zone.
    #[arg(long, env = "TOUROCC_UTC_OFFSET_MINUTES", allow_hyphen_values = true)]
    pub utc_offset_minutes: Option<i32>,
}

impl Config {
    pub fn normalizer(&self) -> Result<DateNormalizer, String> {
        match self.utc_offset_minutes {
            None => Ok(DateNormalizer::host_local()),
            Some(minutes) => DateNormalizer::from_offset_minutes(minutes)
                .ok_or_else(|| format!("utc offset out of range: {minutes} minutes")),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["tourocc"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config.port, 8080);
        assert_eq!(cli.config.compact_threshold, 1000);
        assert_eq!(cli.config.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn migrate_subcommand_and_negative_offset() {
        let cli = Cli::try_parse_from([
            "tourocc",
            "--utc-offset-minutes",
            "-300",
            "--port",
            "9000",
            "migrate",
            "--input",
            "legacy.json",
        ])
        .unwrap();
        assert_eq!(cli.config.addr(), "0.0.0.0:9000");
        assert_eq!(cli.config.utc_offset_minutes, Some(-300));
        assert!(cli.config.normalizer().is_ok());
        match cli.command {
            Some(Command::Migrate { input }) => assert_eq!(input, PathBuf::from("legacy.json")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn offset_beyond_a_day_rejected() {
        let cli = Cli::try_parse_from(["tourocc", "--utc-offset-minutes", "1500"]).unwrap();
        assert!(cli.config.normalizer().is_err());
    }
}

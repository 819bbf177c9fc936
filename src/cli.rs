use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use crate::constants::DEFAULT_MAX_WORKERS;

/// Command-line arguments for the recolte tool.
///
/// Global options apply to both subcommands; sources and destination are
/// described by the YAML sources definition file each subcommand takes.
#[derive(Parser, Debug)]
#[clap(name = "recolte", about = "Collect data from sources and run ingestion on collected files")]
pub struct Args {
    /// Number of parallel [post]collect source pipelines
    #[clap(short = 'W', long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Log level (error, warn, info, debug, trace); defaults to the
    /// LOG_LEVEL environment variable, then info
    #[clap(short = 'L', long)]
    pub log_level: Option<LevelFilter>,

    /// Per-command timeout in seconds; a command still running after this
    /// is killed and its file or source classified as failed
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    /// Resolve the effective log level: flag, then LOG_LEVEL env var,
    /// then info.
    pub fn effective_log_level(&self) -> LevelFilter {
        self.log_level
            .or_else(|| std::env::var("LOG_LEVEL").ok()?.parse().ok())
            .unwrap_or(LevelFilter::Info)
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect sources and run postcollect on each newly collected file
    Collect {
        /// YAML sources definition file
        sources_file: PathBuf,

        /// Dotted collector paths restricting the run; a path selects
        /// every source beneath it. Default is all sources.
        #[clap(value_name = "SOURCE")]
        sources: Vec<String>,
    },

    /// Run postcollect on previously collected files
    Postcollect {
        /// YAML sources definition file
        sources_file: PathBuf,

        /// Files to postcollect; they must live under the root directory.
        /// Default is every file of the hierarchy under root.
        #[clap(value_name = "FILE")]
        files: Vec<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_collect_args() {
        let args = Args::parse_from(&[
            "recolte",
            "-W", "8",
            "-L", "debug",
            "collect",
            "sources.yml",
            "conso.bill",
            "meteofrance",
        ]);

        assert_eq!(args.max_workers, 8);
        assert_eq!(args.log_level, Some(LevelFilter::Debug));
        match args.command {
            Some(Commands::Collect { sources_file, sources }) => {
                assert_eq!(sources_file, PathBuf::from("sources.yml"));
                assert_eq!(sources, ["conso.bill", "meteofrance"]);
            }
            _ => panic!("Expected Collect command"),
        }
    }

    #[test]
    fn test_postcollect_args() {
        let args = Args::parse_from(&[
            "recolte",
            "postcollect",
            "sources.yml",
            "/data/s1/f1.csv",
            "/data/s1/f2.csv",
        ]);

        match args.command {
            Some(Commands::Postcollect { sources_file, files }) => {
                assert_eq!(sources_file, PathBuf::from("sources.yml"));
                assert_eq!(files.len(), 2);
            }
            _ => panic!("Expected Postcollect command"),
        }
    }

    #[test]
    fn test_default_values() {
        let args = Args::parse_from(&["recolte"]);
        assert_eq!(args.max_workers, DEFAULT_MAX_WORKERS);
        assert!(args.log_level.is_none());
        assert!(args.timeout.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_timeout_flag() {
        let args = Args::parse_from(&["recolte", "--timeout", "30", "postcollect", "s.yml"]);
        assert_eq!(args.timeout, Some(30));
    }

    #[test]
    fn test_log_level_flag_wins() {
        let args = Args::parse_from(&["recolte", "-L", "warn"]);
        assert_eq!(args.effective_log_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_log_level_resolved_before_command_is_taken() {
        // Same order as main: the level is read off `args` first, then the
        // subcommand is moved out for dispatch.
        let args = Args::parse_from(&["recolte", "-L", "debug", "collect", "s.yml"]);
        let level = args.effective_log_level();
        let command = args.command;
        assert_eq!(level, LevelFilter::Debug);
        assert!(matches!(command, Some(Commands::Collect { .. })));
    }
}

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// diskclean: find reclaimable space and delete it safely
#[derive(Parser, Debug)]
#[command(
    name = "diskclean",
    version,
    about = "Scan, classify and deduplicate files, then clean behind a safety gate",
    long_about = "diskclean scans a directory tree, classifies files by type, risk and age,\n\
                   finds duplicate content, and deletes only what passes the safety checks.\n\
                   Nothing is deleted unless --confirm DELETE is given.",
    after_help = "EXAMPLES:\n  \
        diskclean analyze ~/Downloads                   Report what could be reclaimed\n  \
        diskclean analyze . --format json               Full report as JSON\n  \
        diskclean analyze / --max-files 100000          Stop after 100k entries\n  \
        diskclean clean ~/tmp --confirm DELETE          Delete safe entries\n  \
        diskclean clean . --confirm DELETE --duplicates Also delete duplicate copies\n  \
        diskclean cache stats                           Show snapshot cache usage\n  \
        diskclean config show                           Print effective configuration"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Debug-level logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory and report reclaimable space (never deletes)
    Analyze {
        /// Directory to analyze
        path: PathBuf,

        /// Skip the snapshot cache and force a fresh scan
        #[arg(long)]
        no_cache: bool,

        /// Stop after this many entries
        #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        max_files: Option<u64>,

        /// Stop after this many seconds
        #[arg(long, value_name = "S", value_parser = clap::value_parser!(u64).range(1..))]
        max_seconds: Option<u64>,

        /// List individual files in each bucket
        #[arg(long)]
        detailed: bool,
    },

    /// Delete approved entries under a directory
    Clean {
        /// Directory to clean
        path: PathBuf,

        /// Confirmation literal; must be exactly DELETE
        #[arg(long, value_name = "TOKEN", default_value = "")]
        confirm: String,

        /// Highest risk level to include
        #[arg(long, default_value = "safe")]
        risk: RiskFilter,

        /// Also delete duplicate copies (originals are always kept)
        #[arg(long)]
        duplicates: bool,

        /// Confirm every entry that needs per-item confirmation
        #[arg(long)]
        yes_confirm_all: bool,

        /// Skip the snapshot cache and force a fresh scan
        #[arg(long)]
        no_cache: bool,
    },

    /// Manage the snapshot cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// View or manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Delete every cached snapshot
    Clear,

    /// Show cache location and record count
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Also apply `<PATH>/.diskclean.toml`
        #[arg(long, value_name = "PATH")]
        project: Option<PathBuf>,
    },

    /// Write the default configuration and create data directories
    Init,

    /// Reset the user configuration to defaults
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RiskFilter {
    /// Only entries that need no confirmation
    Safe,
    /// Safe entries plus those needing confirmation
    Confirm,
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
    fn test_clean_defaults() {
        let cli = Cli::parse_from(["diskclean", "clean", "/tmp/x"]);
        match cli.command {
            Commands::Clean {
                confirm,
                risk,
                duplicates,
                ..
            } => {
                assert_eq!(confirm, "");
                assert_eq!(risk, RiskFilter::Safe);
                assert!(!duplicates);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_format_after_subcommand() {
        let cli = Cli::parse_from(["diskclean", "analyze", ".", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }
}

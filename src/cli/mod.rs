//! CLI interface for rgsearch.
//!
//! Provides command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command-line interface for rgsearch.
#[derive(Parser)]
#[command(name = "rgsearch")]
#[command(author, version, about = "Cancellable file and text search powered by ripgrep", long_about = None)]
pub struct Cli {
    /// Log ripgrep invocations and diagnostics to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Filters shared by both searches.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only include paths matching this glob (repeatable).
    #[arg(short, long = "include", value_name = "GLOB")]
    pub includes: Vec<String>,

    /// Exclude paths matching this glob (repeatable).
    #[arg(short, long = "exclude", value_name = "GLOB")]
    pub excludes: Vec<String>,

    /// Follow symbolic links.
    #[arg(short = 'L', long)]
    pub follow: bool,

    /// Don't respect .gitignore and .ignore files.
    #[arg(long)]
    pub no_ignore: bool,

    /// Respect the global gitignore.
    #[arg(long)]
    pub global_ignore: bool,

    /// Stop after this many results.
    #[arg(short = 'm', long)]
    pub max_results: Option<usize>,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// List files under a directory, relative to it.
    Files {
        /// Directory to search (defaults to the current directory).
        root: Option<PathBuf>,

        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Search file contents for a pattern.
    Text {
        /// The pattern to search for (literal unless --regex is given).
        pattern: String,

        /// Directory to search (defaults to the current directory).
        root: Option<PathBuf>,

        /// Treat the pattern as a regular expression.
        #[arg(short, long)]
        regex: bool,

        /// Only match whole words.
        #[arg(short, long)]
        word: bool,

        /// Use case-sensitive matching (default is case-insensitive).
        #[arg(short = 's', long)]
        case_sensitive: bool,

        /// Allow matches to span lines.
        #[arg(short = 'U', long)]
        multiline: bool,

        /// Maximum matches reported per file.
        #[arg(long)]
        max_per_file: Option<usize>,

        /// Lines of context to show around each match.
        #[arg(short = 'C', long)]
        context: Option<usize>,

        #[command(flatten)]
        filters: FilterArgs,
    },
}

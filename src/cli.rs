use crate::output::OutputFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Trace JSON file
    #[clap(default_value = "trace.json")]
    pub path: PathBuf,

    #[clap(long, value_parser, default_value_t = false)]
    pub verbose: bool,

    #[clap(long, value_parser)]
    pub log: Option<PathBuf>,

    #[clap(long, value_parser)]
    pub config: Option<PathBuf>,

    /// Time budget of one search batch, in milliseconds
    #[clap(long, value_parser)]
    pub budget_ms: Option<u64>,

    /// Print scan metrics when done
    #[clap(long, value_parser, default_value_t = false)]
    pub metrics: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search the trace and print every match
    Search {
        query: String,

        /// Move the cursor forward N matches after the scan
        #[clap(long, value_parser, default_value_t = 0)]
        next: usize,

        /// Move the cursor backward N matches after the scan
        #[clap(long, value_parser, default_value_t = 0)]
        prev: usize,

        /// Place the cursor on the last match
        #[clap(long, value_parser, default_value_t = false)]
        last: bool,

        #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
        output_format: OutputFormat,
    },
    /// Print the flattened trace tree
    List {
        /// Expand collapsed nodes
        #[clap(long, value_parser, default_value_t = false)]
        all: bool,
    },
    /// Navigate matches from a prompt
    Interactive { query: Option<String> },
    /// Generate shell completions
    Completions {
        #[clap(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub mod cli;
pub mod config;
pub mod error;
pub mod interactive;
pub mod metrics;
pub mod output;
pub mod search;
pub mod tree;

pub use crate::error::{Result, TracegrepError};
pub use clap::Parser;
pub use cli::{Cli, Commands};
pub use config::Config;
pub use metrics::Metrics;
pub use output::{OutputFormat, OutputFormatter};
pub use search::{
    reduce, search_in_trace_tree, FrameLoop, ScanOptions, ScanOutcome, SearchAction,
    SearchHandle, SearchResult, SearchState, TraceSearchSession,
};
pub use tree::{NodeId, NodeRef, NodeValue, TraceNodeInput, TraceTree, TraceTreeNode};

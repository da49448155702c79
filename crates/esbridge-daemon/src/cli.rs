//! CLI argument parsing for the esbridge binary.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stream documents out of, and change records into, a search engine.
#[derive(Parser, Debug)]
#[command(name = "esbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/esbridge/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Engine base URL, e.g. http://127.0.0.1:9200
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the engine is reachable, retrying with backoff
    Ping {
        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },

    /// Print new documents as JSON lines until interrupted
    Read {
        /// File holding the resume position; updated after every record
        #[arg(short, long)]
        position_file: Option<PathBuf>,

        /// Index to read; repeat for several (overrides configured indexes)
        #[arg(short, long)]
        index: Vec<String>,
    },

    /// Write change records read as JSON lines from stdin
    Write {
        /// Records per bulk request (overrides destination.bulk_size)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Target index (overrides destination.index)
        #[arg(short, long)]
        index: Option<String>,
    },
}

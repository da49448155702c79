//! esbridge binary library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (ping, read, write)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{
    init_logging, load_settings, ping, ping_with_backoff, read, stream_records, write,
    write_records, WriteSummary,
};

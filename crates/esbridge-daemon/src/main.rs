//! esbridge
//!
//! Moves documents between a search engine and a stream of change records.
//!
//! # Usage
//!
//! ```bash
//! esbridge ping [--timeout-secs 30]
//! esbridge read [--position-file PATH] [--index NAME]...
//! esbridge write [--batch-size N] [--index NAME] < records.jsonl
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/esbridge/config.toml)
//! 3. `--config` file
//! 4. Environment variables (ESBRIDGE_*)
//! 5. CLI flags

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use esbridge_daemon::{init_logging, load_settings, ping, read, write, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(
        cli.config.as_deref(),
        cli.log_level.as_deref(),
        cli.host.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Ping { timeout_secs } => {
            ping(&settings, Duration::from_secs(timeout_secs)).await?;
        }
        Commands::Read {
            position_file,
            index,
        } => {
            read(settings, position_file, index).await?;
        }
        Commands::Write { batch_size, index } => {
            write(settings, batch_size, index).await?;
        }
    }

    Ok(())
}

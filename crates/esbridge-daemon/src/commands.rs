//! Command implementations for the esbridge binary.
//!
//! Records go to stdout and logs to stderr, so `read` output can be piped
//! straight into `write`.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::{backoff::Backoff, ExponentialBackoff};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::signal;
use tracing::{error, info, warn};

use esbridge_client::{ClientError, SearchClient};
use esbridge_destination::Writer;
use esbridge_source::{Reader, SourceError};
use esbridge_types::{ChangeRecord, IndexSettings, Settings};

/// Load settings and apply the global CLI overrides.
pub fn load_settings(
    config_path: Option<&str>,
    log_level: Option<&str>,
    host: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    if let Some(host) = host {
        settings.connection.host = host.to_string();
    }
    Ok(settings)
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Ping until the engine answers or the backoff gives up.
pub async fn ping_with_backoff(
    client: &dyn SearchClient,
    max_elapsed: Duration,
) -> Result<(), ClientError> {
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match client.ping().await {
            Ok(()) => {
                info!(attempts, "Engine reachable");
                return Ok(());
            }
            Err(e) => match backoff.next_backoff() {
                Some(wait) => {
                    warn!(error = %e, retry_in_ms = wait.as_millis(), "Ping failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                None => {
                    error!(error = %e, attempts, "Engine unreachable, giving up");
                    return Err(e);
                }
            },
        }
    }
}

pub async fn ping(settings: &Settings, timeout: Duration) -> Result<()> {
    let client = esbridge_client::connect(&settings.connection)
        .context("Failed to create engine client")?;
    ping_with_backoff(client.as_ref(), timeout)
        .await
        .with_context(|| format!("Engine at {} is not reachable", settings.connection.host))?;
    println!("{} is reachable", settings.connection.host);
    Ok(())
}

/// Read the resume position, treating a missing file as a cold start.
pub fn load_position(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read position file {path:?}")),
    }
}

/// Replace the position file through a temporary sibling so a crash never
/// leaves a half-written position behind.
pub fn store_position(path: &Path, position: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, position)
        .with_context(|| format!("Failed to write position file {tmp:?}"))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace position file {path:?}"))?;
    Ok(())
}

/// Emit records as JSON lines until `shutdown` resolves or every poller
/// stops. A record's position is stored only after its line is flushed.
///
/// Returns the number of records emitted.
pub async fn stream_records<W, F>(
    reader: &Reader,
    out: &mut W,
    position_file: Option<&Path>,
    shutdown: F,
) -> Result<u64>
where
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut emitted = 0u64;

    loop {
        let record = tokio::select! {
            _ = &mut shutdown => break,
            next = reader.read_next() => match next {
                Ok(record) => record,
                Err(SourceError::QueueClosed) => {
                    anyhow::bail!("All index pollers stopped after {emitted} records");
                }
                Err(e) => return Err(e).context("Failed to read record"),
            },
        };

        serde_json::to_writer(&mut *out, &record).context("Failed to encode record")?;
        out.write_all(b"\n")?;
        out.flush()?;
        emitted += 1;

        if let Some(position) = &record.position {
            if let Some(path) = position_file {
                store_position(path, position)?;
            }
            reader.acknowledge(position);
        }
    }

    Ok(emitted)
}

pub async fn read(
    settings: Settings,
    position_file: Option<PathBuf>,
    indexes: Vec<String>,
) -> Result<()> {
    let mut source = settings.source;
    if !indexes.is_empty() {
        source.indexes = indexes.into_iter().map(IndexSettings::new).collect();
    }
    source.validate().context("Invalid source configuration")?;

    let client = esbridge_client::connect(&settings.connection)
        .context("Failed to create engine client")?;
    let resume = match &position_file {
        Some(path) => load_position(path)?,
        None => None,
    };

    let reader = Reader::new(client, source);
    reader
        .open(resume.as_deref())
        .await
        .context("Failed to open reader")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = stream_records(&reader, &mut out, position_file.as_deref(), shutdown_signal()).await;
    reader.teardown().await;

    let emitted = result?;
    info!(emitted, "Reader finished");
    Ok(())
}

/// Totals reported by [`write_records`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub batches: u64,
    pub written: u64,
}

/// Parse JSON lines from `input` and write them in batches of `batch_size`.
/// Blank lines are ignored; a malformed line or a failed batch stops the run.
pub async fn write_records<R>(writer: &Writer, input: R, batch_size: usize) -> Result<WriteSummary>
where
    R: AsyncBufRead + Unpin,
{
    let batch_size = batch_size.max(1);
    let mut summary = WriteSummary::default();
    let mut batch: Vec<ChangeRecord> = Vec::with_capacity(batch_size);
    let mut lines = input.lines();
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: ChangeRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid change record on line {line_no}"))?;
        batch.push(record);

        if batch.len() >= batch_size {
            flush(writer, &mut batch, &mut summary).await?;
        }
    }
    if !batch.is_empty() {
        flush(writer, &mut batch, &mut summary).await?;
    }

    Ok(summary)
}

async fn flush(
    writer: &Writer,
    batch: &mut Vec<ChangeRecord>,
    summary: &mut WriteSummary,
) -> Result<()> {
    match writer.write(batch).await {
        Ok(written) => {
            summary.batches += 1;
            summary.written += written as u64;
            batch.clear();
            Ok(())
        }
        Err(e) => {
            summary.written += e.written as u64;
            Err(anyhow::Error::new(e)).with_context(|| {
                format!("Bulk write failed after {} records", summary.written)
            })
        }
    }
}

pub async fn write(
    settings: Settings,
    batch_size: Option<usize>,
    index: Option<String>,
) -> Result<()> {
    let mut destination = settings.destination;
    if let Some(size) = batch_size {
        destination.bulk_size = size;
    }
    if index.is_some() {
        destination.index = index;
    }
    destination
        .validate()
        .context("Invalid destination configuration")?;

    let client = esbridge_client::connect(&settings.connection)
        .context("Failed to create engine client")?;
    let encoder =
        esbridge_client::encoder_for(settings.connection.version, destination.index_type.clone());
    let writer = Writer::new(client, encoder, &destination);
    writer.open().await.context("Failed to open writer")?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = write_records(&writer, stdin, destination.bulk_size).await;
    writer.teardown().await;

    let summary = result?;
    info!(batches = summary.batches, written = summary.written, "Writer finished");
    println!("{} records written in {} batches", summary.written, summary.batches);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.json");

        assert_eq!(load_position(&path).unwrap(), None);

        store_position(&path, br#"{"indexPositions":{"orders":3}}"#).unwrap();
        assert_eq!(
            load_position(&path).unwrap().as_deref(),
            Some(&br#"{"indexPositions":{"orders":3}}"#[..])
        );
        assert!(!dir.path().join("position.json.tmp").exists());
    }
}

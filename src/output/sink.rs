//! Append-only CSV sink for classified wallets
//!
//! Every row is written, flushed and synced before `append` returns, so a
//! crash loses at most the row being written. A failed write is cut back to
//! the last complete row before anything else is written. An address is
//! written at most once per run.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashSet, VecDeque};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::analysis::types::{ClassificationThresholds, WalletRecord};
use crate::error::{Error, Result};

/// Column header row
pub const CSV_COLUMNS: &str = "address,balance_sol,win_rate,profit_loss_ratio,daily_trades,avg_holding_hours,total_trades,last_active,discovered_at";

/// Written in place of an unknown timestamp
pub const UNKNOWN_TIMESTAMP: &str = "N/A";

/// Destination that can make written bytes durable
#[async_trait]
pub trait DurableWrite: Send {
    async fn write_durable(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Drop everything past the first `len` bytes; later writes continue there
    async fn truncate_to(&mut self, len: u64) -> std::io::Result<()>;
}

#[async_trait]
impl DurableWrite for tokio::fs::File {
    async fn write_durable(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes).await?;
        self.flush().await?;
        self.sync_data().await
    }

    async fn truncate_to(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len).await?;
        self.seek(SeekFrom::Start(len)).await?;
        self.sync_data().await
    }
}

/// What happened to an appended record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    Written,
    /// Address already written (or waiting to be) this run
    Duplicate,
    /// Both attempts failed; retried on the next append or on close
    Deferred,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub written: usize,
    /// Rows given up on after their retries failed
    pub dropped: usize,
}

#[derive(Debug)]
struct DeferredRow {
    address: String,
    line: String,
}

/// Deduplicated, durable result writer
pub struct ResultSink<W: DurableWrite = tokio::fs::File> {
    path: PathBuf,
    writer: W,
    written: HashSet<String>,
    deferred: VecDeque<DeferredRow>,
    stats: SinkStats,
    /// Length of the header plus every complete row
    committed: u64,
    /// Bytes past `committed` may be on disk
    dirty: bool,
}

/// Header lines; depend only on the thresholds
pub fn header(thresholds: &ClassificationThresholds) -> String {
    format!(
        "# Smart wallets\n# Thresholds: {}\n{}\n",
        thresholds.describe(),
        CSV_COLUMNS
    )
}

/// One CSV row for `record`
pub fn format_row(record: &WalletRecord, discovered_at: DateTime<Utc>) -> String {
    let last_active = record
        .last_active()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| UNKNOWN_TIMESTAMP.to_string());

    format!(
        "{},{:.2},{:.2},{:.2},{:.1},{:.1},{},{},{}\n",
        record.address(),
        record.balance(),
        record.win_rate(),
        record.profit_loss_ratio(),
        record.daily_trades(),
        record.avg_holding_time(),
        record.total_trades(),
        last_active,
        discovered_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

impl ResultSink<tokio::fs::File> {
    /// Create (or truncate) the output file and write the header
    pub async fn initialize(path: impl AsRef<Path>, thresholds: &ClassificationThresholds) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to open {}: {}", path.display(), e)))?;

        let sink = Self::with_writer(path, file, thresholds).await?;
        info!("Initialized output file: {}", sink.path.display());
        Ok(sink)
    }
}

impl<W: DurableWrite> ResultSink<W> {
    /// Wrap an open writer and write the header
    pub async fn with_writer(path: PathBuf, mut writer: W, thresholds: &ClassificationThresholds) -> Result<Self> {
        let header = header(thresholds);
        writer
            .write_durable(header.as_bytes())
            .await
            .map_err(|e| Error::Persistence(format!("Failed to write header to {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            writer,
            written: HashSet::new(),
            deferred: VecDeque::new(),
            stats: SinkStats::default(),
            committed: header.len() as u64,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn contains(&self, address: &str) -> bool {
        self.written.contains(address) || self.deferred.iter().any(|d| d.address == address)
    }

    /// Append a record unless its address was already written
    pub async fn append(&mut self, record: &WalletRecord) -> SinkOutcome {
        self.retry_deferred().await;

        if self.contains(record.address()) {
            debug!(address = %record.address(), "Already written, skipping");
            return SinkOutcome::Duplicate;
        }

        let line = format_row(record, Utc::now());
        match self.write_with_retry(&line).await {
            Ok(()) => {
                self.written.insert(record.address().to_string());
                self.stats.written += 1;
                SinkOutcome::Written
            }
            Err(e) => {
                warn!(
                    address = %record.address(),
                    error = %e,
                    "Failed to write result, will retry on next write"
                );
                self.deferred.push_back(DeferredRow {
                    address: record.address().to_string(),
                    line,
                });
                SinkOutcome::Deferred
            }
        }
    }

    /// Last chance for deferred rows, then release the writer
    pub async fn close(mut self) -> SinkStats {
        self.retry_deferred().await;
        if self.dirty {
            if let Err(e) = self.writer.truncate_to(self.committed).await {
                warn!(error = %e, "Output may end with a partial row");
            }
        }
        info!(
            "Closed output file {} ({} rows, {} dropped)",
            self.path.display(),
            self.stats.written,
            self.stats.dropped
        );
        self.stats
    }

    async fn write_with_retry(&mut self, line: &str) -> std::io::Result<()> {
        match self.write_row(line).await {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!(error = %first, "Write failed, retrying once");
                self.write_row(line).await
            }
        }
    }

    /// Write one complete row, or leave the output ending at the last one
    async fn write_row(&mut self, line: &str) -> std::io::Result<()> {
        if self.dirty {
            self.writer.truncate_to(self.committed).await?;
            self.dirty = false;
        }

        match self.writer.write_durable(line.as_bytes()).await {
            Ok(()) => {
                self.committed += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.dirty = true;
                match self.writer.truncate_to(self.committed).await {
                    Ok(()) => self.dirty = false,
                    Err(rollback) => debug!(error = %rollback, "Rollback failed, retrying before next write"),
                }
                Err(e)
            }
        }
    }

    async fn retry_deferred(&mut self) {
        while let Some(row) = self.deferred.pop_front() {
            match self.write_row(&row.line).await {
                Ok(()) => {
                    info!(address = %row.address, "Deferred result written");
                    self.written.insert(row.address);
                    self.stats.written += 1;
                }
                Err(e) => {
                    warn!(
                        address = %row.address,
                        error = %e,
                        "Dropping result after repeated write failures"
                    );
                    self.stats.dropped += 1;
                }
            }
        }
    }
}

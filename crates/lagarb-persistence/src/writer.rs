//! JSON Lines event log writer.
//!
//! One file per UTC day (`events_YYYY-MM-DD.jsonl`), opened in append mode
//! so restarts never truncate. Each line is a complete record, so an
//! interrupted write damages at most the last line.
//!
//! A record is written at most once: lines handed to the file are never
//! retried, and only the unwritten tail of a failed batch is kept. While
//! the file cannot be written the pending buffer is capped and the oldest
//! records are dropped and counted.

use crate::error::PersistenceResult;
use crate::record::EventRecord;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Pending records held per buffered record when no cap is given.
const DEFAULT_PENDING_FACTOR: usize = 10;

struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    path: PathBuf,
    records_written: usize,
}

pub struct EventLogWriter {
    base_dir: PathBuf,
    buffer: VecDeque<EventRecord>,
    max_buffer_size: usize,
    max_pending: usize,
    active_writer: Option<ActiveWriter>,
    total_written: u64,
    dropped: u64,
}

impl EventLogWriter {
    /// Creates `base_dir` if missing. `max_buffer_size` of 1 writes through.
    pub fn new(base_dir: impl AsRef<Path>, max_buffer_size: usize) -> PersistenceResult<Self> {
        let max_buffer_size = max_buffer_size.max(1);
        Self::with_max_pending(
            base_dir,
            max_buffer_size,
            max_buffer_size * DEFAULT_PENDING_FACTOR,
        )
    }

    /// Like `new`, holding at most `max_pending` unwritten records.
    pub fn with_max_pending(
        base_dir: impl AsRef<Path>,
        max_buffer_size: usize,
        max_pending: usize,
    ) -> PersistenceResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        let max_buffer_size = max_buffer_size.max(1);

        Ok(Self {
            base_dir,
            buffer: VecDeque::with_capacity(max_buffer_size),
            max_buffer_size,
            max_pending: max_pending.max(max_buffer_size),
            active_writer: None,
            total_written: 0,
            dropped: 0,
        })
    }

    pub fn append(&mut self, record: EventRecord) -> PersistenceResult<()> {
        if self.buffer.len() >= self.max_pending {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(record);

        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> PersistenceResult<()> {
        self.flush_at(Utc::now())
    }

    /// Write buffered records to the file for `now`'s date, rotating if the
    /// day changed.
    ///
    /// If the file cannot be opened every record stays pending. If a write
    /// fails partway, the records already handed to the file are not
    /// retried and the file is reopened on the next flush.
    pub fn flush_at(&mut self, now: DateTime<Utc>) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let today = now.format("%Y-%m-%d").to_string();
        if self
            .active_writer
            .as_ref()
            .is_some_and(|w| w.date != today)
        {
            self.close_active_writer();
        }

        let active = match self.active_writer.take() {
            Some(active) => active,
            None => self.open_writer(&today)?,
        };
        let active = self.active_writer.insert(active);

        let mut batch = std::mem::take(&mut self.buffer);
        let mut written = 0usize;
        let mut result: PersistenceResult<()> = Ok(());
        while let Some(record) = batch.pop_front() {
            let line = match serde_json::to_string(&record) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Dropping unserializable event");
                    self.dropped += 1;
                    continue;
                }
            };
            if let Err(e) = writeln!(active.writer, "{line}") {
                batch.push_front(record);
                result = Err(e.into());
                break;
            }
            written += 1;
        }
        if result.is_ok() {
            result = active.writer.flush().map_err(Into::into);
        }

        active.records_written += written;
        self.total_written += written as u64;

        if let Err(e) = result {
            warn!(
                date = %today,
                written,
                unwritten = batch.len(),
                error = %e,
                "Event log write failed"
            );
            self.active_writer = None;
            self.buffer = batch;
            return Err(e);
        }

        debug!(date = %today, records = written, "Flushed events");
        Ok(())
    }

    /// Flush pending records and close the file.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Records discarded because the pending buffer was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    #[must_use]
    pub fn current_path(&self) -> Option<&Path> {
        self.active_writer.as_ref().map(|w| w.path.as_path())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn open_writer(&self, date: &str) -> PersistenceResult<ActiveWriter> {
        let path = self.base_dir.join(format!("events_{date}.jsonl"));
        info!(path = %path.display(), "Opening event log (append mode)");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(ActiveWriter {
            writer: BufWriter::new(file),
            date: date.to_string(),
            path,
            records_written: 0,
        })
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush event log on close");
            }
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed event log"
            );
        }
    }
}

impl Drop for EventLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush event log on drop");
        }
        self.close_active_writer();
    }
}

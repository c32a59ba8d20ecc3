//! Append-only JSONL audit trail for GitOps sync cycles.
//!
//! This is a flat log, not a queryable history store: [`EventLog`] buffers
//! events in memory during a cycle and appends them to disk once, in
//! cycle order. There is no index, no query interface, and no
//! compaction — reading the file back (e.g. for `status`) means reading
//! every line.
//!
//! # Example
//!
//! ```
//! use sync_events::EventLog;
//! use sync_types::{SyncEvent, SyncEventKind};
//! use chrono::Utc;
//!
//! let mut log = EventLog::new();
//! log.record(SyncEvent {
//!     timestamp: Utc::now(),
//!     cycle_id: 1,
//!     kind: SyncEventKind::CycleStarted,
//! });
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sync_types::SyncEvent;

/// Default events file name.
pub const EVENTS_FILE: &str = "events.jsonl";

/// Events file path for a given state directory.
pub fn events_path(state_dir: &Path) -> PathBuf {
    state_dir.join(EVENTS_FILE)
}

/// In-memory buffer of [`SyncEvent`]s, flushed to a JSONL file on demand.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<SyncEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: SyncEvent) {
        self.events.push(event);
    }

    /// Append all buffered events to `path` in JSONL format, one record per line.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create events dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;

        let mut writer = std::io::BufWriter::new(file);
        for event in &self.events {
            let line = serde_json::to_string(event).context("failed to serialize event")?;
            writeln!(writer, "{line}").context("failed to write event line")?;
        }
        writer.flush().context("failed to flush events file")?;
        Ok(())
    }

    /// Read every event previously written to `path`. Returns an empty log
    /// if the file doesn't exist.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let file = File::open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line.with_context(|| format!("failed to read line from {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let event: SyncEvent = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse event JSON: {line}"))?;
            events.push(event);
        }
        Ok(Self { events })
    }

    pub fn events_for_cycle(&self, cycle_id: u64) -> Vec<&SyncEvent> {
        self.events.iter().filter(|e| e.cycle_id == cycle_id).collect()
    }

    pub fn all_events(&self) -> &[SyncEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sync_types::{SyncAction, SyncEventKind};
    use tempfile::tempdir;

    fn sample(cycle_id: u64, kind: SyncEventKind) -> SyncEvent {
        SyncEvent {
            timestamp: Utc::now(),
            cycle_id,
            kind,
        }
    }

    #[test]
    fn new_log_is_empty() {
        let log = EventLog::new();
        assert!(log.is_empty());
    }

    #[test]
    fn record_and_filter_by_cycle() {
        let mut log = EventLog::new();
        log.record(sample(1, SyncEventKind::CycleStarted));
        log.record(sample(2, SyncEventKind::CycleStarted));
        log.record(sample(1, SyncEventKind::CycleCompleted {
            successful: 1,
            failed: 0,
            skipped: 0,
            commit: Some("abc".into()),
        }));

        assert_eq!(log.events_for_cycle(1).len(), 2);
        assert_eq!(log.events_for_cycle(2).len(), 1);
    }

    #[test]
    fn write_then_read_round_trips() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");

        let mut log = EventLog::new();
        log.record(sample(1, SyncEventKind::CycleStarted));
        log.record(sample(1, SyncEventKind::AppSyncStarted { app_id: "intervalai".into() }));
        log.record(sample(1, SyncEventKind::AppSyncFinished {
            app_id: "intervalai".into(),
            action: SyncAction::Install,
            success: true,
            rolled_back: false,
            error: None,
        }));
        log.write_to_file(&path).expect("write");

        let loaded = EventLog::read_from_file(&path).expect("read");
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn write_appends_across_calls() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");

        let mut first = EventLog::new();
        first.record(sample(1, SyncEventKind::CycleStarted));
        first.write_to_file(&path).expect("write first");

        let mut second = EventLog::new();
        second.record(sample(2, SyncEventKind::CycleStarted));
        second.write_to_file(&path).expect("write second");

        let loaded = EventLog::read_from_file(&path).expect("read");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn read_from_file_missing_is_empty() {
        let td = tempdir().expect("tempdir");
        let loaded = EventLog::read_from_file(&td.path().join("missing.jsonl")).expect("read");
        assert!(loaded.is_empty());
    }

    #[test]
    fn path_helper() {
        let base = PathBuf::from("state");
        assert_eq!(events_path(&base), PathBuf::from("state").join(EVENTS_FILE));
    }
}

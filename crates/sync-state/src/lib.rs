//! Last-cycle-summary snapshot store.
//!
//! The reconciliation engine's correctness never depends on this file: the
//! last-applied commit lives in memory for the life of the process, and a
//! restart simply re-syncs once. This snapshot exists solely so the `status`
//! subcommand has something to report without attaching to a running
//! process.
//!
//! # Example
//!
//! ```
//! use sync_state::SnapshotStore;
//! use sync_types::CycleSummary;
//! use chrono::Utc;
//! use std::path::Path;
//!
//! let store = SnapshotStore::new(Path::new("/tmp/gitops-sync-state"));
//! let summary = CycleSummary {
//!     cycle_id: 1,
//!     results: Vec::new(),
//!     started_at: Utc::now(),
//!     ended_at: Utc::now(),
//!     skipped_all: true,
//!     commit: None,
//! };
//! store.save(&summary).expect("save");
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sync_types::CycleSummary;

/// Default snapshot file name.
pub const SNAPSHOT_FILE: &str = "last-cycle.json";

/// Snapshot file path for a given state directory.
pub fn snapshot_path(state_dir: &Path) -> PathBuf {
    state_dir.join(SNAPSHOT_FILE)
}

/// Persists and reloads the most recent [`CycleSummary`].
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: snapshot_path(state_dir),
        }
    }

    /// Overwrite the snapshot with `summary`, writing to a temp file first
    /// and renaming into place so a reader never observes a partial write.
    pub fn save(&self, summary: &CycleSummary) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state dir {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(summary)
            .context("failed to serialize cycle summary to JSON")?;

        fs::write(&tmp_path, json)
            .with_context(|| format!("failed to write snapshot file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename snapshot file to {}", self.path.display()))?;

        Ok(())
    }

    /// Load the last saved summary, if any.
    pub fn load(&self) -> Result<Option<CycleSummary>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read snapshot file {}", self.path.display()))?;
        let summary: CycleSummary = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot JSON from {}", self.path.display()))?;

        Ok(Some(summary))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sync_types::{SyncAction, SyncResult};
    use tempfile::tempdir;

    fn sample_summary() -> CycleSummary {
        let now = Utc::now();
        CycleSummary {
            cycle_id: 7,
            results: vec![SyncResult {
                app_id: "intervalai".to_string(),
                success: true,
                action: SyncAction::Upgrade,
                error: None,
                rolled_back: false,
                started_at: now,
                ended_at: now,
            }],
            started_at: now,
            ended_at: now,
            skipped_all: false,
            commit: Some("abc123".to_string()),
        }
    }

    #[test]
    fn load_missing_returns_none() {
        let td = tempdir().expect("tempdir");
        let store = SnapshotStore::new(td.path());
        assert!(store.load().expect("load").is_none());
        assert!(!store.exists());
    }

    #[test]
    fn save_then_load_round_trips() {
        let td = tempdir().expect("tempdir");
        let store = SnapshotStore::new(td.path());

        let summary = sample_summary();
        store.save(&summary).expect("save");
        assert!(store.exists());

        let loaded = store.load().expect("load").expect("some summary");
        assert_eq!(loaded.cycle_id, 7);
        assert_eq!(loaded.commit, Some("abc123".to_string()));
        assert_eq!(loaded.results.len(), 1);
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let td = tempdir().expect("tempdir");
        let store = SnapshotStore::new(td.path());

        let mut first = sample_summary();
        first.cycle_id = 1;
        store.save(&first).expect("save first");

        let mut second = sample_summary();
        second.cycle_id = 2;
        store.save(&second).expect("save second");

        let loaded = store.load().expect("load").expect("some summary");
        assert_eq!(loaded.cycle_id, 2);
    }

    #[test]
    fn path_helper() {
        let base = PathBuf::from("/tmp/gitops-sync-state");
        assert_eq!(snapshot_path(&base), base.join(SNAPSHOT_FILE));
    }
}

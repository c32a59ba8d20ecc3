//! Reconciliation Engine: the state machine that drives one sync cycle —
//! `Idle -> Refreshing -> Detecting -> Scheduling -> Draining -> Idle`.
//!
//! Non-reentrancy is enforced with an `AtomicBool`-backed RAII guard scoped
//! to the engine instance, the in-process analogue of the grounding
//! codebase's cross-process [`LockFile`]: a single long-running daemon has
//! no second process to race against, so a file lock would be the wrong
//! granularity. A tick that finds the engine already busy is dropped with a
//! warning; the cycle counter is not advanced.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use sync_events::EventLog;
use sync_git::GitWorkspace;
use sync_state::SnapshotStore;
use sync_types::{
    Application, CycleSummary, SyncAction, SyncConfig, SyncEvent, SyncEventKind, SyncResult,
};

use crate::release;
use crate::reporter::Reporter;

/// RAII guard acquired at the start of a tick and released on drop,
/// restoring `Idle` whether the tick returns normally, early, or panics.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Owns the git workspace and in-memory reconciliation state for one
/// configured sync target. One `Engine` per running daemon.
pub struct Engine {
    config: SyncConfig,
    workspace: GitWorkspace,
    last_applied_commit: Option<String>,
    cycle_count: u64,
    in_progress: AtomicBool,
    events_path: Option<PathBuf>,
    snapshot: Option<SnapshotStore>,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: SyncConfig, workspace: GitWorkspace) -> Self {
        Self {
            config,
            workspace,
            last_applied_commit: None,
            cycle_count: 0,
            in_progress: AtomicBool::new(false),
            events_path: None,
            snapshot: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist the JSONL event log and last-cycle snapshot under `state_dir`.
    /// Without this, the engine runs purely in memory.
    pub fn with_state_dir(mut self, state_dir: &std::path::Path) -> Self {
        self.events_path = Some(sync_events::events_path(state_dir));
        self.snapshot = Some(SnapshotStore::new(state_dir));
        self
    }

    /// A handle the service loop can flip to cancel any in-flight
    /// subprocess the next time it polls its deadline.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn last_applied_commit(&self) -> Option<&str> {
        self.last_applied_commit.as_deref()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Run one cycle, or drop it if a cycle is already in flight. Returns
    /// `None` for a dropped tick, an aborted (git-error) cycle, or an
    /// unchanged-commit cycle that produced no per-application work — the
    /// latter still returns `Some` with `skipped_all = true`, since it is a
    /// real (if uneventful) cycle, unlike a dropped tick.
    pub fn tick(&mut self, reporter: &mut dyn Reporter) -> Option<CycleSummary> {
        let Some(_guard) = CycleGuard::try_acquire(&self.in_progress) else {
            reporter.warn("cycle already in progress; dropping this tick");
            return None;
        };

        let cycle_id = self.cycle_count + 1;
        let started_at = Utc::now();
        let mut events = EventLog::new();
        events.record(SyncEvent {
            timestamp: started_at,
            cycle_id,
            kind: SyncEventKind::CycleStarted,
        });

        if let Err(e) = self.workspace.refresh() {
            reporter.error(&format!("git refresh failed: {e}"));
            events.record(SyncEvent {
                timestamp: Utc::now(),
                cycle_id,
                kind: SyncEventKind::CycleDropped {
                    reason: e.to_string(),
                },
            });
            self.flush_events(&events);
            return None;
        }

        let commit = match self.workspace.current_commit() {
            Ok(commit) => commit,
            Err(e) => {
                reporter.error(&format!("failed to read HEAD: {e}"));
                events.record(SyncEvent {
                    timestamp: Utc::now(),
                    cycle_id,
                    kind: SyncEventKind::CycleDropped {
                        reason: e.to_string(),
                    },
                });
                self.flush_events(&events);
                return None;
            }
        };

        self.cycle_count = cycle_id;

        if self.last_applied_commit.as_deref() == Some(commit.as_str()) {
            events.record(SyncEvent {
                timestamp: Utc::now(),
                cycle_id,
                kind: SyncEventKind::CycleSkippedUnchanged {
                    commit: commit.clone(),
                },
            });
            let summary = CycleSummary {
                cycle_id,
                results: Vec::new(),
                started_at,
                ended_at: Utc::now(),
                skipped_all: true,
                commit: Some(commit),
            };
            self.flush_events(&events);
            self.save_snapshot(&summary);
            reporter.info(&summary.summary_line());
            return Some(summary);
        }

        for app in &self.config.applications {
            events.record(SyncEvent {
                timestamp: started_at,
                cycle_id,
                kind: SyncEventKind::AppSyncStarted {
                    app_id: app.id.clone(),
                },
            });
        }

        let workspace_root = self.workspace.path().to_path_buf();
        let results = schedule(
            &self.config.applications,
            &self.config,
            &workspace_root,
            self.config.sync.concurrency,
            &self.cancel,
        );

        for result in &results {
            events.record(SyncEvent {
                timestamp: result.ended_at,
                cycle_id,
                kind: SyncEventKind::AppSyncFinished {
                    app_id: result.app_id.clone(),
                    action: result.action,
                    success: result.success,
                    rolled_back: result.rolled_back,
                    error: result.error.clone(),
                },
            });
            if result.rolled_back {
                events.record(SyncEvent {
                    timestamp: result.ended_at,
                    cycle_id,
                    kind: SyncEventKind::RollbackTriggered {
                        app_id: result.app_id.clone(),
                    },
                });
            }
        }

        // Commit advance happens unconditionally, even with per-application
        // failures: the git commit is the input the engine reacted to, not
        // a correctness token for whether that reaction fully succeeded.
        self.last_applied_commit = Some(commit.clone());

        let ended_at = Utc::now();
        let summary = CycleSummary {
            cycle_id,
            results,
            started_at,
            ended_at,
            skipped_all: false,
            commit: Some(commit),
        };

        events.record(SyncEvent {
            timestamp: ended_at,
            cycle_id,
            kind: SyncEventKind::CycleCompleted {
                successful: summary.successful(),
                failed: summary.failed(),
                skipped: summary.skipped(),
                commit: summary.commit.clone(),
            },
        });

        self.flush_events(&events);
        self.save_snapshot(&summary);

        reporter.info(&summary.summary_line());
        for result in &summary.results {
            if !result.success {
                reporter.error(&format!(
                    "{}: {}",
                    result.app_id,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        Some(summary)
    }

    fn flush_events(&self, events: &EventLog) {
        let Some(path) = &self.events_path else {
            return;
        };
        if let Err(e) = events.write_to_file(path) {
            eprintln!("warning: failed to write event log to {}: {e}", path.display());
        }
    }

    fn save_snapshot(&self, summary: &CycleSummary) {
        let Some(store) = &self.snapshot else {
            return;
        };
        if let Err(e) = store.save(summary) {
            eprintln!("warning: failed to write last-cycle snapshot: {e}");
        }
    }
}

/// Dispatch one [`release::sync`] task per application, bounded to
/// `concurrency` tasks in flight, as a chunked batch-and-join over threads —
/// the same idiom the grounding codebase's parallel engine uses for bounded
/// fan-out. Unlike that codebase, a task's panic or error never aborts the
/// batch: it is captured as a failed [`SyncResult`] and scheduling
/// continues with the next chunk.
fn schedule(
    apps: &[Application],
    config: &SyncConfig,
    workspace_root: &std::path::Path,
    concurrency: usize,
    cancel: &Arc<AtomicBool>,
) -> Vec<SyncResult> {
    let concurrency = concurrency.max(1);
    let mut results = Vec::with_capacity(apps.len());
    let workspace_root = Arc::new(workspace_root.to_path_buf());

    for chunk in apps.chunks(concurrency) {
        let mut handles = Vec::with_capacity(chunk.len());
        for app in chunk {
            let app = app.clone();
            let config = config.clone();
            let workspace_root = Arc::clone(&workspace_root);
            let cancel = Arc::clone(cancel);
            handles.push(thread::spawn(move || {
                release::sync(&app, &config, &workspace_root, &cancel)
            }));
        }
        for handle in handles {
            match handle.join() {
                Ok(result) => results.push(result),
                Err(_) => {
                    let now = Utc::now();
                    results.push(SyncResult {
                        app_id: "unknown".to_string(),
                        success: false,
                        action: SyncAction::None,
                        error: Some("sync task panicked".to_string()),
                        rolled_back: false,
                        started_at: now,
                        ended_at: now,
                    });
                }
            }
        }
    }

    results
}

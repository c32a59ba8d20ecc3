//! # Types
//!
//! Domain types for the GitOps sync engine: the declared application and
//! sync configuration, the workspace and engine state, per-application and
//! per-cycle results, and the closed error taxonomy shared by every other
//! crate in the workspace.
//!
//! ## Serialization
//!
//! Config-facing types implement `Serialize`/`Deserialize` for loading from
//! the YAML sync config. Durations are accepted as either a human-readable
//! string (`"60s"`) or a millisecond count, and always serialize back out
//! as milliseconds so they round-trip.
//!
//! ## Stability
//!
//! These types are considered stable unless otherwise noted.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Deserialize a `Duration` from either a human-readable string (`"5s"`, `"500ms"`) or a
/// plain integer count of milliseconds.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DurationHelper {
        String(String),
        U64(u64),
    }

    match DurationHelper::deserialize(deserializer)? {
        DurationHelper::String(s) => humantime::parse_duration(&s)
            .map_err(|e| serde::de::Error::custom(format!("invalid duration: {}", e))),
        DurationHelper::U64(ms) => Ok(Duration::from_millis(ms)),
    }
}

/// Serialize a `Duration` as milliseconds so it round-trips with [`deserialize_duration`].
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// One declared unit of deployment: a chart, a namespace, and the value
/// files that parameterize it.
///
/// Every string field that can reach a subprocess argv (`id`, `namespace`,
/// `path`, entries of `value_files`) is expected to have already passed
/// `sync_validate` by the time this struct is constructed — [`crate::SyncError`]
/// is how that requirement is enforced at config-load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Stable identifier; used as the Helm release name.
    #[serde(rename = "name", alias = "id")]
    pub id: String,
    /// Target Kubernetes namespace.
    pub namespace: String,
    /// Chart path, relative to the git workspace root.
    pub path: PathBuf,
    /// Value-file paths, relative to `path`, applied in order.
    #[serde(default, rename = "valueFiles", alias = "value_files")]
    pub value_files: Vec<PathBuf>,
    /// Whether this application participates in reconciliation at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether this application is synced automatically on each cycle.
    #[serde(default = "default_true", rename = "autoSync", alias = "auto_sync")]
    pub auto_sync: bool,
}

fn default_true() -> bool {
    true
}

impl Application {
    /// `true` when this application should be skipped without side effects.
    pub fn is_skipped(&self) -> bool {
        !self.enabled || !self.auto_sync
    }
}

/// Git source configuration: the repository to poll and the branch to track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    pub repository: String,
    pub branch: String,
}

/// Health-check sub-config: retry budget and backoff shape for [`HealthCheck`] probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(
        default = "default_initial_delay_ms",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration",
        rename = "initialDelay",
        alias = "initial_delay_ms"
    )]
    pub initial_delay: Duration,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(
        default = "default_max_delay_ms",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration",
        rename = "maxDelay",
        alias = "max_delay_ms"
    )]
    pub max_delay: Duration,
}

fn default_retries() -> u32 {
    3
}
fn default_initial_delay_ms() -> Duration {
    Duration::from_millis(5000)
}
fn default_backoff_factor() -> f64 {
    2.0
}
fn default_max_delay_ms() -> Duration {
    Duration::from_millis(60_000)
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retries: default_retries(),
            initial_delay: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay: default_max_delay_ms(),
        }
    }
}

/// The `sync:` block of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub interval: Duration,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default, rename = "autoRollback", alias = "auto_rollback")]
    pub auto_rollback: bool,
    #[serde(default, rename = "dryRun", alias = "dry_run")]
    pub dry_run: bool,
}

fn default_concurrency() -> usize {
    3
}

/// Fully loaded, validated sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub sync: SyncSettings,
    pub git: GitConfig,
    #[serde(default, rename = "healthCheck", alias = "health_check")]
    pub health_check: HealthCheckConfig,
    pub applications: Vec<Application>,
}

/// On-disk git checkout state, owned exclusively by the git workspace component.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    pub path: PathBuf,
    pub last_commit: Option<String>,
}

/// What the release driver actually did for one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Install,
    Upgrade,
    Skip,
    None,
}

/// Sealed, per-application outcome of one sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub app_id: String,
    pub success: bool,
    pub action: SyncAction,
    pub error: Option<String>,
    pub rolled_back: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn skipped(app_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            app_id: app_id.into(),
            success: true,
            action: SyncAction::Skip,
            error: None,
            rolled_back: false,
            started_at: at,
            ended_at: at,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

/// Sealed, per-cycle aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: u64,
    pub results: Vec<SyncResult>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub skipped_all: bool,
    pub commit: Option<String>,
}

impl CycleSummary {
    pub fn successful(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.success && r.action != SyncAction::Skip)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.action == SyncAction::Skip)
            .count()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Sync completed: {}/{} succeeded, {} failed, {} skipped ({:.1}s)",
            self.successful(),
            self.total(),
            self.failed(),
            self.skipped(),
            self.duration_secs()
        )
    }
}

/// One entry in the append-only audit trail: what happened, to what, and when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub timestamp: DateTime<Utc>,
    pub cycle_id: u64,
    #[serde(flatten)]
    pub kind: SyncEventKind,
}

/// The kind of state transition recorded by [`SyncEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEventKind {
    CycleStarted,
    CycleSkippedUnchanged { commit: String },
    CycleDropped { reason: String },
    CycleCompleted {
        successful: usize,
        failed: usize,
        skipped: usize,
        commit: Option<String>,
    },
    AppSyncStarted { app_id: String },
    AppSyncFinished {
        app_id: String,
        action: SyncAction,
        success: bool,
        rolled_back: bool,
        error: Option<String>,
    },
    RollbackTriggered { app_id: String },
}

/// Which kind of release action produced a [`ReleaseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStage {
    Status,
    Install,
    Upgrade,
    Rollback,
}

impl std::fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReleaseStage::Status => "status",
            ReleaseStage::Install => "install",
            ReleaseStage::Upgrade => "upgrade",
            ReleaseStage::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// The closed error taxonomy shared by every component. Library code returns
/// `Result<T, SyncError>`; the CLI/daemon boundary wraps these with
/// `anyhow::Context` when it needs to attach free-form operational context.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("config error at {path}: field {field}: {cause}")]
    Config {
        path: PathBuf,
        field: String,
        cause: String,
    },

    #[error("validation error: field {field} value {value:?} failed rule {rule}")]
    Validation {
        field: String,
        value: String,
        rule: String,
    },

    #[error("git error: {0}")]
    Git(String),

    #[error("release {stage} failed for {app_id}: {message}")]
    Release {
        stage: ReleaseStage,
        app_id: String,
        message: String,
    },

    #[error("health check failed for {app_id} after {attempts} attempts")]
    Health { app_id: String, attempts: u32 },

    #[error("failed to spawn {binary}: {cause}")]
    ExecSpawn { binary: String, cause: String },

    #[error("{binary} timed out after {elapsed_ms}ms")]
    ExecTimeout {
        binary: String,
        elapsed_ms: u64,
        partial_stdout: String,
        partial_stderr: String,
    },

    #[error("{binary} exited with code {code:?}: {stderr}")]
    ExecExit {
        binary: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(self, SyncError::Config { .. } | SyncError::Validation { .. })
    }
}

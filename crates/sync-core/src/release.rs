//! Release Driver: drives one Helm release to match one declared
//! [`Application`] — install or upgrade, optional health probe, optional
//! rollback on failure.
//!
//! `sync` is infallible in its return type: every failure mode (a failed
//! Helm invocation, a failed health probe, a failed rollback) is captured
//! into the returned [`SyncResult`] rather than propagated, so the
//! reconciliation engine can aggregate across applications without a task
//! ever unwinding the cycle.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sync_process::{run, RunOptions};
use sync_types::{Application, ReleaseStage, SyncAction, SyncConfig, SyncError, SyncResult};

use crate::health;
use crate::reporter::sanitize;

const STATUS_TIMEOUT: Duration = Duration::from_secs(30);
const RELEASE_TIMEOUT: Duration = Duration::from_secs(600);
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Reconcile one application against its declared state. See §4.5.
pub fn sync(
    app: &Application,
    config: &SyncConfig,
    workspace_root: &Path,
    cancel: &Arc<AtomicBool>,
) -> SyncResult {
    let started_at = Utc::now();

    if app.is_skipped() {
        return SyncResult::skipped(app.id.clone(), started_at);
    }

    let had_prior_release = match release_exists(&app.id, &app.namespace, cancel) {
        Ok(exists) => exists,
        Err(e) => return failed(app, SyncAction::None, started_at, e, false),
    };

    let action = if had_prior_release {
        SyncAction::Upgrade
    } else {
        SyncAction::Install
    };
    let chart_path = workspace_root.join(&app.path);

    let release_err = invoke_release(
        action,
        &app.id,
        &app.namespace,
        &chart_path,
        &app.value_files,
        config.sync.dry_run,
        cancel,
    )
    .err();

    if let Some(SyncError::Cancelled) = release_err {
        return failed(app, action, started_at, SyncError::Cancelled, false);
    }

    let health_err = match &release_err {
        Some(_) => None,
        None if config.health_check.enabled && !config.sync.dry_run => {
            health::probe(&app.id, &app.namespace, &config.health_check, cancel).err()
        }
        None => None,
    };

    let Some(error) = release_err.or(health_err) else {
        return SyncResult {
            app_id: app.id.clone(),
            success: true,
            action,
            error: None,
            rolled_back: false,
            started_at,
            ended_at: Utc::now(),
        };
    };

    if !had_prior_release || !config.sync.auto_rollback || config.sync.dry_run {
        return failed(app, action, started_at, error, false);
    }

    match rollback(&app.id, &app.namespace, cancel) {
        Ok(()) => failed(app, action, started_at, error, true),
        Err(rollback_err) => failed(
            app,
            action,
            started_at,
            SyncError::Internal(format!("{error}; rollback also failed: {rollback_err}")),
            false,
        ),
    }
}

fn failed(
    app: &Application,
    action: SyncAction,
    started_at: chrono::DateTime<Utc>,
    error: SyncError,
    rolled_back: bool,
) -> SyncResult {
    SyncResult {
        app_id: app.id.clone(),
        success: false,
        action,
        error: Some(sanitize(&error.to_string())),
        rolled_back,
        started_at,
        ended_at: Utc::now(),
    }
}

/// `helm status <id> -n <namespace>`. Nonzero exit is the tool's defined
/// convention for "no such release", not an error.
fn release_exists(id: &str, namespace: &str, cancel: &Arc<AtomicBool>) -> Result<bool, SyncError> {
    let opts = RunOptions::new()
        .with_timeout(STATUS_TIMEOUT)
        .with_cancel(Arc::clone(cancel));
    match run("helm", &["status", id, "-n", namespace], &opts) {
        Ok(_) => Ok(true),
        Err(SyncError::ExecExit { .. }) => Ok(false),
        Err(SyncError::ExecTimeout { .. }) if cancel.load(Ordering::SeqCst) => {
            Err(SyncError::Cancelled)
        }
        Err(e) => Err(SyncError::Release {
            stage: ReleaseStage::Status,
            app_id: id.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Argv for `helm install`/`helm upgrade`, in the order §4.5 step 3
/// specifies: name, chart path, namespace, one `-f` per value file,
/// `--create-namespace` (install only), `--wait`, `--dry-run` (if set).
pub(crate) fn build_release_argv(
    action: SyncAction,
    id: &str,
    namespace: &str,
    chart_path: &Path,
    value_files: &[PathBuf],
    dry_run: bool,
) -> Result<Vec<String>, SyncError> {
    let mut argv = vec![
        verb(action).to_string(),
        id.to_string(),
        path_str(chart_path)?.to_string(),
        "-n".to_string(),
        namespace.to_string(),
    ];
    for value_file in value_files {
        argv.push("-f".to_string());
        argv.push(path_str(&chart_path.join(value_file))?.to_string());
    }
    if action == SyncAction::Install {
        argv.push("--create-namespace".to_string());
    }
    argv.push("--wait".to_string());
    if dry_run {
        argv.push("--dry-run".to_string());
    }
    Ok(argv)
}

fn invoke_release(
    action: SyncAction,
    id: &str,
    namespace: &str,
    chart_path: &Path,
    value_files: &[PathBuf],
    dry_run: bool,
    cancel: &Arc<AtomicBool>,
) -> Result<(), SyncError> {
    let argv = build_release_argv(action, id, namespace, chart_path, value_files, dry_run)?;
    let argv_refs: Vec<&str> = argv.iter().map(String::as_str).collect();
    let opts = RunOptions::new()
        .with_timeout(RELEASE_TIMEOUT)
        .with_cancel(Arc::clone(cancel));

    run("helm", &argv_refs, &opts).map_err(|e| match e {
        SyncError::ExecTimeout { .. } if cancel.load(Ordering::SeqCst) => SyncError::Cancelled,
        other => SyncError::Release {
            stage: stage(action),
            app_id: id.to_string(),
            message: other.to_string(),
        },
    })?;
    Ok(())
}

fn rollback(id: &str, namespace: &str, cancel: &Arc<AtomicBool>) -> Result<(), SyncError> {
    let opts = RunOptions::new()
        .with_timeout(ROLLBACK_TIMEOUT)
        .with_cancel(Arc::clone(cancel));
    run("helm", &["rollback", id, "-n", namespace], &opts).map_err(|e| SyncError::Release {
        stage: ReleaseStage::Rollback,
        app_id: id.to_string(),
        message: e.to_string(),
    })?;
    Ok(())
}

fn verb(action: SyncAction) -> &'static str {
    match action {
        SyncAction::Install => "install",
        SyncAction::Upgrade => "upgrade",
        SyncAction::Skip | SyncAction::None => "status",
    }
}

fn stage(action: SyncAction) -> ReleaseStage {
    match action {
        SyncAction::Install => ReleaseStage::Install,
        _ => ReleaseStage::Upgrade,
    }
}

fn path_str(path: &Path) -> Result<&str, SyncError> {
    path.to_str()
        .ok_or_else(|| SyncError::Internal(format!("non-utf8 path: {}", path.display())))
}

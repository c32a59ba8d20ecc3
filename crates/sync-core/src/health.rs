//! Health Prober: bounded-retry readiness check after an install/upgrade.
//!
//! Each attempt blocks on `kubectl wait` rather than polling in a loop —
//! the control plane already tracks the availability condition, so there's
//! no reason to re-derive it client-side. Between attempts the caller sleeps
//! for the deterministic (no-jitter) schedule [`sync_retry::BackoffPolicy`]
//! computes, so a test can assert the exact inter-attempt delays.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sync_process::{run, RunOptions};
use sync_retry::{retry_with_backoff, BackoffPolicy};
use sync_types::{HealthCheckConfig, SyncError};

/// Per-attempt `kubectl wait` budget. Not presently exposed in the config
/// schema — a fixed value matching the documented default.
const PER_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Probe readiness of `app_id`'s deployment in `namespace`, retrying per
/// `health_check`'s backoff shape. Callers only invoke this when
/// `health_check.enabled`; this function does not check that itself.
pub fn probe(
    app_id: &str,
    namespace: &str,
    health_check: &HealthCheckConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<(), SyncError> {
    let policy = BackoffPolicy {
        initial_delay: health_check.initial_delay,
        backoff_factor: health_check.backoff_factor,
        max_delay: health_check.max_delay,
    };

    let mut attempts_made: u32 = 0;
    let result = retry_with_backoff(health_check.retries, &policy, |attempt| {
        if cancel.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        attempts_made = attempt;
        wait_once(app_id, namespace, cancel)
    });

    result.map_err(|e| match e {
        SyncError::Cancelled => SyncError::Cancelled,
        _ => SyncError::Health {
            app_id: app_id.to_string(),
            attempts: attempts_made,
        },
    })
}

/// `kubectl wait --for=condition=Available deployment -l app=<id> -n
/// <namespace> --timeout=<per-attempt>s`, per §4.6.
fn wait_once(app_id: &str, namespace: &str, cancel: &Arc<AtomicBool>) -> Result<(), SyncError> {
    let selector = format!("app={app_id}");
    let timeout_flag = format!("--timeout={PER_ATTEMPT_TIMEOUT_SECS}s");
    let opts = RunOptions::new()
        .with_timeout(Duration::from_secs(PER_ATTEMPT_TIMEOUT_SECS + 5))
        .with_cancel(Arc::clone(cancel));

    run(
        "kubectl",
        &[
            "wait",
            "--for=condition=Available",
            "deployment",
            "-l",
            &selector,
            "-n",
            namespace,
            &timeout_flag,
        ],
        &opts,
    )
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::Path;
    use std::time::Instant;
    use tempfile::tempdir;

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    fn fast_policy(retries: u32) -> HealthCheckConfig {
        HealthCheckConfig {
            enabled: true,
            retries,
            initial_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(20),
        }
    }

    fn write_fake_kubectl(dir: &Path, exit_code: i32) {
        let script_path = dir.join(if cfg!(windows) { "kubectl.bat" } else { "kubectl" });
        let body = if cfg!(windows) {
            format!("@echo off\r\nexit /b {exit_code}\r\n")
        } else {
            format!("#!/bin/sh\nexit {exit_code}\n")
        };
        std::fs::write(&script_path, body).expect("write fake kubectl");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&script_path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&script_path, perms).unwrap();
        }
    }

    fn prepended_path(dir: &Path) -> String {
        match std::env::var("PATH") {
            Ok(p) => format!("{}:{p}", dir.display()),
            Err(_) => dir.display().to_string(),
        }
    }

    #[test]
    #[serial]
    fn succeeds_on_first_attempt() {
        let td = tempdir().expect("tempdir");
        write_fake_kubectl(td.path(), 0);
        let path = prepended_path(td.path());

        temp_env::with_var("PATH", Some(path), || {
            let result = probe("intervalai", "default", &fast_policy(3), &no_cancel());
            assert!(result.is_ok());
        });
    }

    #[test]
    #[serial]
    fn s4_exhausts_all_retries_and_reports_attempts() {
        let td = tempdir().expect("tempdir");
        write_fake_kubectl(td.path(), 1);
        let path = prepended_path(td.path());

        temp_env::with_var("PATH", Some(path), || {
            let err = probe("intervalai", "default", &fast_policy(3), &no_cancel()).unwrap_err();
            match err {
                SyncError::Health { attempts, .. } => assert_eq!(attempts, 3),
                other => panic!("unexpected error: {other:?}"),
            }
        });
    }

    #[test]
    #[serial]
    fn sleeps_for_the_exact_deterministic_schedule() {
        let td = tempdir().expect("tempdir");
        write_fake_kubectl(td.path(), 1);
        let path = prepended_path(td.path());

        temp_env::with_var("PATH", Some(path), || {
            let policy = HealthCheckConfig {
                enabled: true,
                retries: 3,
                initial_delay: Duration::from_millis(20),
                backoff_factor: 2.0,
                max_delay: Duration::from_millis(100),
            };
            let start = Instant::now();
            let _ = probe("intervalai", "default", &policy, &no_cancel());
            // 20ms + 40ms between the three attempts, no jitter ceiling to respect.
            assert!(start.elapsed() >= Duration::from_millis(60));
        });
    }

    #[test]
    fn cancellation_short_circuits_without_a_subprocess_call() {
        let cancel = Arc::new(AtomicBool::new(true));
        let err = probe("a", "ns", &fast_policy(3), &cancel).unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
    }
}

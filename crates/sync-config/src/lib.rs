//! YAML configuration loading for the GitOps sync engine.
//!
//! [`load_config`] is the single entry point: it reads the file, parses it
//! against [`sync_types::SyncConfig`], and validates every field that can
//! reach a subprocess argv through [`sync_validate`] before handing the
//! config back. A config that fails any rule never reaches the
//! reconciliation engine — config errors are always fatal at startup.
//!
//! # Example
//!
//! ```no_run
//! use sync_config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("./sync-config.yaml")).expect("load config");
//! println!("tracking branch {}", config.git.branch);
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sync_types::{Application, SyncConfig, SyncError};
use sync_validate::Kind;

/// Default config file name, used when `CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "sync-config.yaml";

/// Load and validate the config at `path`.
///
/// Parsing uses `serde_yaml` directly against [`SyncConfig`]'s
/// `#[serde(default = "fn")]`-annotated fields; no intermediate builder.
pub fn load_config(path: &Path) -> Result<SyncConfig, SyncError> {
    let content = std::fs::read_to_string(path).map_err(|e| SyncError::Config {
        path: path.to_path_buf(),
        field: "<file>".to_string(),
        cause: e.to_string(),
    })?;

    let raw: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| SyncError::Config {
        path: path.to_path_buf(),
        field: "<root>".to_string(),
        cause: e.to_string(),
    })?;

    validate_interval_string(&raw)?;

    let config: SyncConfig = serde_yaml::from_value(raw).map_err(|e| SyncError::Config {
        path: path.to_path_buf(),
        field: "<root>".to_string(),
        cause: e.to_string(),
    })?;

    validate_config(&config, path)?;
    Ok(config)
}

/// `sync.interval` must match `^[0-9]+[smh]$`, a stricter grammar than
/// [`sync_types::deserialize_duration`]'s humantime/millis parsing (which
/// exists to round-trip already-loaded configs, e.g. status snapshots, not
/// to validate user input). Check the raw YAML string before it's turned
/// into a `Duration` and the original text is gone for good.
fn validate_interval_string(raw: &serde_yaml::Value) -> Result<(), SyncError> {
    let Some(interval) = raw.get("sync").and_then(|s| s.get("interval")) else {
        return Ok(());
    };
    let Some(interval) = interval.as_str() else {
        return Ok(());
    };
    sync_validate::validate(interval, Kind::Duration, "sync.interval")
}

/// Run every §C4 validation rule against an already-parsed config.
pub fn validate_config(config: &SyncConfig, path: &Path) -> Result<(), SyncError> {
    let to_config_err = |field: &str, cause: String| SyncError::Config {
        path: path.to_path_buf(),
        field: field.to_string(),
        cause,
    };

    sync_validate::validate(&config.git.branch, Kind::Branch, "git.branch")?;

    if config.sync.concurrency < 1 {
        return Err(to_config_err(
            "sync.concurrency",
            "must be >= 1".to_string(),
        ));
    }

    let hc = &config.health_check;
    if hc.enabled {
        if hc.retries < 1 {
            return Err(to_config_err(
                "healthCheck.retries",
                "must be >= 1".to_string(),
            ));
        }
        if hc.backoff_factor < 1.0 {
            return Err(to_config_err(
                "healthCheck.backoffFactor",
                "must be >= 1.0".to_string(),
            ));
        }
        if hc.max_delay < hc.initial_delay {
            return Err(to_config_err(
                "healthCheck.maxDelay",
                "must be >= initialDelay".to_string(),
            ));
        }
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    for (index, app) in config.applications.iter().enumerate() {
        validate_application(app, index)?;
        let key = (app.id.clone(), app.namespace.clone());
        if !seen.insert(key) {
            return Err(to_config_err(
                &format!("applications[{index}]"),
                format!(
                    "duplicate (name, namespace) pair: ({}, {})",
                    app.id, app.namespace
                ),
            ));
        }
    }

    Ok(())
}

fn validate_application(app: &Application, index: usize) -> Result<(), SyncError> {
    sync_validate::validate(&app.id, Kind::K8sName, &format!("applications[{index}].name"))?;
    sync_validate::validate(
        &app.namespace,
        Kind::K8sName,
        &format!("applications[{index}].namespace"),
    )?;
    sync_validate::validate_rel_path(&app.path, &format!("applications[{index}].path"))?;
    for (vf_index, value_file) in app.value_files.iter().enumerate() {
        sync_validate::validate_rel_path(
            value_file,
            &format!("applications[{index}].valueFiles[{vf_index}]"),
        )?;
    }
    Ok(())
}

/// Resolve the config file path: `CONFIG_PATH` env var if set, else
/// [`DEFAULT_CONFIG_FILE`] in the current directory.
pub fn resolve_config_path() -> PathBuf {
    std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
}

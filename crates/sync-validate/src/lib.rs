//! Input validation for everything that ends up on a subprocess command
//! line: Kubernetes names, git branches, relative chart/value-file paths,
//! and duration strings.
//!
//! Every validator here is a pure predicate plus a [`validate`] entry point
//! that turns a failure into a [`SyncError::Validation`]. Nothing in this
//! crate touches the filesystem or spawns a process — it exists purely to
//! reject untrusted config input before it can reach [`sync_process`] via
//! the release driver or health prober.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sync_types::SyncError;

/// The kind of value being validated; determines which rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    K8sName,
    Branch,
    RelPath,
    Duration,
}

impl Kind {
    fn rule_name(self) -> &'static str {
        match self {
            Kind::K8sName => "k8s_name",
            Kind::Branch => "branch",
            Kind::RelPath => "rel_path",
            Kind::Duration => "duration",
        }
    }
}

static K8S_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

static BRANCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9/_.-]+$").unwrap());

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+[smh]$").unwrap());

/// `true` when `value` is a valid Kubernetes DNS-label (RFC 1123 subdomain segment).
pub fn is_k8s_name(value: &str) -> bool {
    value.len() <= 253 && K8S_NAME_RE.is_match(value)
}

/// `true` when `value` is an acceptable git branch/ref name.
pub fn is_branch(value: &str) -> bool {
    value.len() <= 255 && !value.contains("..") && BRANCH_RE.is_match(value)
}

/// `true` when `value` is a duration string of the form `<N>{s|m|h}`.
pub fn is_duration(value: &str) -> bool {
    DURATION_RE.is_match(value)
}

/// `true` when `path`, once normalized, stays inside its base: not
/// absolute, no `..` component.
pub fn is_rel_path(path: &Path) -> bool {
    if path.is_absolute() {
        return false;
    }
    !path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
}

/// Validate `value` against `kind`, producing a [`SyncError::Validation`]
/// naming `field` on failure.
pub fn validate(value: &str, kind: Kind, field: &str) -> Result<(), SyncError> {
    let ok = match kind {
        Kind::K8sName => is_k8s_name(value),
        Kind::Branch => is_branch(value),
        Kind::Duration => is_duration(value),
        Kind::RelPath => is_rel_path(Path::new(value)),
    };

    if ok {
        Ok(())
    } else {
        Err(SyncError::Validation {
            field: field.to_string(),
            value: value.to_string(),
            rule: kind.rule_name().to_string(),
        })
    }
}

/// Validate a [`Path`] against the `rel_path` rule directly, without a
/// string round-trip — used for chart/value-file paths that are already
/// `PathBuf`s in the config model.
pub fn validate_rel_path(path: &Path, field: &str) -> Result<(), SyncError> {
    if is_rel_path(path) {
        Ok(())
    } else {
        Err(SyncError::Validation {
            field: field.to_string(),
            value: path.display().to_string(),
            rule: Kind::RelPath.rule_name().to_string(),
        })
    }
}

//! Git workspace management for the GitOps sync engine.
//!
//! [`GitWorkspace`] owns exactly one local checkout of one repository at one
//! pinned branch. `ensure` clones it on first use; `refresh` always
//! hard-resets to `origin/<branch>` and removes untracked files so the
//! working tree is deterministic even after local corruption — this is
//! chosen over a merge/pull specifically to avoid ever depending on the
//! previous state of the checkout.
//!
//! All operations go through [`sync_process::run`]; there is no direct use
//! of [`std::process::Command`] in this crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sync_process::{run, RunOptions};
use sync_types::SyncError;

const GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// One managed checkout of a single repository/branch pair.
#[derive(Debug, Clone)]
pub struct GitWorkspace {
    repo_url: String,
    branch: String,
    local_path: PathBuf,
}

impl GitWorkspace {
    pub fn new(repo_url: impl Into<String>, branch: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_url: repo_url.into(),
            branch: branch.into(),
            local_path: local_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.local_path
    }

    /// Clone into `local_path` if it doesn't exist yet, otherwise refresh.
    pub fn ensure(&self) -> Result<(), SyncError> {
        if self.local_path.join(".git").exists() {
            return self.refresh();
        }
        self.clone_fresh()
    }

    fn clone_fresh(&self) -> Result<(), SyncError> {
        if let Some(parent) = self.local_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let opts = RunOptions::new().with_timeout(GIT_TIMEOUT);
        run(
            "git",
            &[
                "clone",
                "--branch",
                &self.branch,
                &self.repo_url,
                path_str(&self.local_path)?,
            ],
            &opts,
        )
        .map_err(to_git_error)?;
        Ok(())
    }

    /// Fetch `branch` from `origin`, hard-reset to it, and clean untracked files.
    pub fn refresh(&self) -> Result<(), SyncError> {
        let opts = RunOptions::new()
            .with_dir(&self.local_path)
            .with_timeout(GIT_TIMEOUT);

        run(
            "git",
            &["fetch", "origin", &self.branch],
            &opts,
        )
        .map_err(to_git_error)?;

        let target = format!("origin/{}", self.branch);
        run("git", &["reset", "--hard", &target], &opts).map_err(to_git_error)?;
        run("git", &["clean", "-fd"], &opts).map_err(to_git_error)?;
        Ok(())
    }

    /// The current `HEAD` commit hash as a hex string.
    pub fn current_commit(&self) -> Result<String, SyncError> {
        let opts = RunOptions::new()
            .with_dir(&self.local_path)
            .with_timeout(GIT_TIMEOUT);
        let out = run("git", &["rev-parse", "HEAD"], &opts).map_err(to_git_error)?;
        Ok(out.stdout.trim().to_string())
    }
}

fn path_str(path: &Path) -> Result<&str, SyncError> {
    path.to_str()
        .ok_or_else(|| SyncError::Git(format!("non-utf8 path: {}", path.display())))
}

fn to_git_error(e: SyncError) -> SyncError {
    match e {
        SyncError::ExecExit { stderr, .. } => SyncError::Git(stderr),
        SyncError::ExecTimeout { partial_stderr, .. } => SyncError::Git(format!(
            "git command timed out: {partial_stderr}"
        )),
        SyncError::ExecSpawn { cause, .. } => SyncError::Git(format!("failed to spawn git: {cause}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn init_bare_repo_with_commit(dir: &Path, branch: &str) {
        let work = dir.join("work");
        std::fs::create_dir_all(&work).unwrap();
        run_git(&work, &["init", "-b", branch]);
        run_git(&work, &["config", "user.email", "test@example.com"]);
        run_git(&work, &["config", "user.name", "Test User"]);
        run_git(&work, &["commit", "--allow-empty", "-m", "init"]);
    }

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .expect("git");
        assert!(status.success());
    }

    #[test]
    fn ensure_clones_when_missing() {
        let td = tempdir().expect("tempdir");
        init_bare_repo_with_commit(td.path(), "main");
        let source = td.path().join("work");

        let dest = td.path().join("checkout");
        let ws = GitWorkspace::new(source.display().to_string(), "main", &dest);
        ws.ensure().expect("ensure");

        assert!(dest.join(".git").exists());
        assert_eq!(ws.current_commit().unwrap().len(), 40);
    }

    #[test]
    fn ensure_refreshes_when_present() {
        let td = tempdir().expect("tempdir");
        init_bare_repo_with_commit(td.path(), "main");
        let source = td.path().join("work");
        let dest = td.path().join("checkout");

        let ws = GitWorkspace::new(source.display().to_string(), "main", &dest);
        ws.ensure().expect("first ensure");
        let first_commit = ws.current_commit().unwrap();

        run_git(&source, &["commit", "--allow-empty", "-m", "second"]);
        ws.ensure().expect("second ensure");
        let second_commit = ws.current_commit().unwrap();

        assert_ne!(first_commit, second_commit);
    }

    #[test]
    fn refresh_discards_local_changes() {
        let td = tempdir().expect("tempdir");
        init_bare_repo_with_commit(td.path(), "main");
        let source = td.path().join("work");
        let dest = td.path().join("checkout");

        let ws = GitWorkspace::new(source.display().to_string(), "main", &dest);
        ws.ensure().expect("ensure");

        std::fs::write(dest.join("untracked.txt"), "scratch").unwrap();
        ws.refresh().expect("refresh");

        assert!(!dest.join("untracked.txt").exists());
    }
}

//! Git CLI adapter for the clone fallback path.
//!
//! Every function shells out to the system `git` binary via
//! [`tokio::process::Command`].  The clone lives in an ephemeral workspace
//! owned by exactly one fallback invocation and recursively deleted on every
//! exit path, including failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::normalize::LOG_FORMAT;

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Transient directory owning one cloned repository tree.
///
/// Deletion happens on `Drop`, so cleanup covers early returns and error
/// paths without explicit bookkeeping.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("commitcache-tmp-")
            .tempdir()
            .map_err(|e| {
                Error::Upstream(anyhow::Error::new(e).context("failed to create clone workspace"))
            })?;
        debug!(path = %dir.path().display(), "created clone workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory the clone of `repo` lands in.
    pub fn repo_dir(&self, repo: &str) -> PathBuf {
        self.dir.path().join(repo)
    }
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

/// Run `git clone -n <repo_url>` (no checkout) inside the workspace.
///
/// The success signal is the expected directory existing afterwards, not
/// the exit status; on absence the captured stderr decides between
/// not-found and a generic failure.
#[instrument(skip(workspace), fields(%repo_url))]
pub async fn clone_no_checkout(
    workspace: &Workspace,
    repo_url: &str,
    repo: &str,
) -> Result<PathBuf> {
    let mut cmd = Command::new("git");
    cmd.arg("clone").arg("-n").arg(repo_url);
    cmd.current_dir(workspace.path());
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!("spawning git clone -n");

    let output = cmd
        .output()
        .await
        .map_err(|e| Error::Upstream(anyhow::Error::new(e).context("failed to spawn git clone")))?;

    let repo_dir = workspace.repo_dir(repo);
    if !repo_dir.is_dir() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Repository not found") {
            return Err(Error::NotFound {
                repo: repo_url.to_string(),
            });
        }
        return Err(Error::upstream(format!(
            "git clone failed (status {}): {}",
            output.status,
            stderr.trim(),
        )));
    }

    debug!("git clone complete");
    Ok(repo_dir)
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Raw sentinel-framed log output for one page of history.
#[instrument(fields(repo = %repo_dir.display(), page, per_page))]
pub async fn log_page(repo_dir: &Path, page: u32, per_page: u32) -> Result<String> {
    let skip = (page as u64 - 1) * per_page as u64;
    let output = run_git(
        repo_dir,
        &[
            "log",
            &format!("--pretty=format:{LOG_FORMAT}"),
            "--skip",
            &skip.to_string(),
            "-n",
            &per_page.to_string(),
        ],
    )
    .await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Raw sentinel-framed log output for the whole history.
#[instrument(fields(repo = %repo_dir.display()))]
pub async fn log_all(repo_dir: &Path) -> Result<String> {
    let output = run_git(repo_dir, &["log", &format!("--pretty=format:{LOG_FORMAT}")]).await?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ---------------------------------------------------------------------------
// Count
// ---------------------------------------------------------------------------

/// Ground-truth commit count via `git rev-list --count HEAD`.
#[instrument(fields(repo = %repo_dir.display()))]
pub async fn rev_list_count(repo_dir: &Path) -> Result<u64> {
    let output = run_git(repo_dir, &["rev-list", "--count", "HEAD"]).await?;
    let text = String::from_utf8_lossy(&output.stdout);
    text.trim().parse().map_err(|e| {
        Error::protocol(format!("unparsable rev-list count {:?}: {e}", text.trim()))
    })
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

async fn run_git(repo_dir: &Path, args: &[&str]) -> Result<std::process::Output> {
    let subcommand = args.first().copied().unwrap_or("");

    let mut cmd = Command::new("git");
    cmd.args(args);
    cmd.current_dir(repo_dir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().await.map_err(|e| {
        Error::Upstream(anyhow::Error::new(e).context(format!("failed to spawn git {subcommand}")))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::upstream(format!(
            "git {subcommand} failed (status {}): {}",
            output.status,
            stderr.trim(),
        )));
    }

    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .is_ok()
    }

    async fn run(dir: &Path, args: &[&str], envs: &[(&str, &str)]) {
        let mut cmd = Command::new("git");
        cmd.args(["-c", "user.name=Jane Doe", "-c", "user.email=jane@example.com"]);
        cmd.args(args);
        cmd.current_dir(dir);
        for (k, v) in envs {
            cmd.env(k, v);
        }
        let output = cmd.output().await.expect("spawn git");
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// Build a throwaway repository with two commits, the newer one carrying
    /// a multi-line body.
    async fn seed_origin(dir: &Path) {
        run(dir, &["init", "-q", "-b", "main"], &[]).await;
        run(
            dir,
            &["commit", "--allow-empty", "-q", "-m", "Initial commit"],
            &[
                ("GIT_AUTHOR_DATE", "2021-09-26T21:53:49+00:00"),
                ("GIT_COMMITTER_DATE", "2021-09-26T21:53:49+00:00"),
            ],
        )
        .await;
        run(
            dir,
            &[
                "commit",
                "--allow-empty",
                "-q",
                "-m",
                "Add new line",
                "-m",
                "Added new line on readme",
            ],
            &[
                ("GIT_AUTHOR_DATE", "2021-09-26T21:55:26+00:00"),
                ("GIT_COMMITTER_DATE", "2021-09-26T21:55:26+00:00"),
            ],
        )
        .await;
    }

    #[tokio::test]
    async fn clone_log_and_count_roundtrip() {
        if !git_available().await {
            return;
        }

        let origin = tempfile::tempdir().unwrap();
        seed_origin(origin.path()).await;

        let workspace = Workspace::create().unwrap();
        let origin_url = origin.path().to_str().unwrap();
        let repo_name = origin.path().file_name().unwrap().to_str().unwrap();

        let repo_dir = clone_no_checkout(&workspace, origin_url, repo_name)
            .await
            .unwrap();

        assert_eq!(rev_list_count(&repo_dir).await.unwrap(), 2);

        let all = normalize::parse_log_output(&log_all(&repo_dir).await.unwrap()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "Add new line\n\nAdded new line on readme");
        assert_eq!(all[0].author, "Jane Doe <jane@example.com>");
        assert_eq!(all[1].message, "Initial commit");

        // skip = (page-1)*per_page lands on the oldest commit.
        let page2 = normalize::parse_log_output(&log_page(&repo_dir, 2, 1).await.unwrap()).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].message, "Initial commit");
    }

    #[tokio::test]
    async fn missing_clone_directory_is_classified() {
        if !git_available().await {
            return;
        }

        let workspace = Workspace::create().unwrap();
        let err = clone_no_checkout(&workspace, "/nonexistent/origin", "origin")
            .await
            .unwrap_err();
        // Local path clones fail without GitHub's "Repository not found"
        // marker, so this classifies as a generic upstream failure.
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[test]
    fn workspace_is_deleted_on_drop() {
        let workspace = Workspace::create().unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.is_dir());
        drop(workspace);
        assert!(!path.exists());
    }
}

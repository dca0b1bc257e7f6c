//! Fallback coordination between the two retrieval paths.
//!
//! The GitHub API path is primary.  On failure the git CLI path substitutes
//! for it, with one exception: a not-found failure is source-independent,
//! so cloning would only repeat the same answer more expensively and the
//! fallback is skipped.  The retry/timeout wrapping policy is applied
//! uniformly around each path; the coordinator itself performs no retries.

pub mod clone;
pub mod remote;

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ResilienceConfig;
use crate::error::{Error, Result};
use crate::model::CommitPage;

use self::clone::CliCommitService;
use self::remote::ApiCommitService;

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct CommitService {
    api: ApiCommitService,
    cli: CliCommitService,
    policy: ResilienceConfig,
    force_use_cli: bool,
}

impl CommitService {
    pub fn new(
        api: ApiCommitService,
        cli: CliCommitService,
        policy: ResilienceConfig,
        force_use_cli: bool,
    ) -> Self {
        Self {
            api,
            cli,
            policy,
            force_use_cli,
        }
    }

    pub async fn commit_page(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CommitPage> {
        if self.force_use_cli {
            info!("GitHub API path disabled by configuration, using git CLI");
            return with_policy(self.policy, || {
                self.cli.commit_page(owner, repo, page, per_page)
            })
            .await;
        }

        match with_policy(self.policy, || {
            self.api.commit_page(owner, repo, page, per_page)
        })
        .await
        {
            Ok(page) => Ok(page),
            Err(e) if e.skips_fallback() => Err(e),
            Err(e) => {
                warn!(error = %e, "GitHub API path failed, falling back to git CLI");
                with_policy(self.policy, || {
                    self.cli.commit_page(owner, repo, page, per_page)
                })
                .await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wrapping policy
// ---------------------------------------------------------------------------

/// Apply the attempt-count/timeout/backoff policy to one path's call.
///
/// Only retriable kinds are re-attempted; a fatal parse or budget failure
/// is never downgraded into another try.
async fn with_policy<T, F, Fut>(policy: ResilienceConfig, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let timeout = Duration::from_secs(policy.attempt_timeout_secs);
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                detail: format!(
                    "attempt did not complete within {}s",
                    policy.attempt_timeout_secs,
                ),
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.attempts && e.is_retriable() => {
                warn!(attempt, error = %e, "attempt failed, retrying");
                tokio::time::sleep(Duration::from_millis(policy.backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CloneConfig, GitHubConfig};
    use crate::github::{CommitSource, PageBatch};
    use crate::model::CommitRecord;
    use crate::store::{CommitStore, SqliteStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Source that always fails with the error produced by `make_error`,
    /// counting how often it was asked.
    struct FailSource {
        make_error: fn() -> Error,
        calls: AtomicUsize,
    }

    impl FailSource {
        fn new(make_error: fn() -> Error) -> Arc<Self> {
            Arc::new(Self {
                make_error,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CommitSource for FailSource {
        async fn fetch_page(
            &self,
            _owner: &str,
            _repo: &str,
            _page: u32,
            _per_page: u32,
        ) -> Result<PageBatch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.make_error)())
        }
    }

    fn record(i: usize) -> CommitRecord {
        CommitRecord {
            sha: format!("sha-{i}"),
            message: format!("commit {i}"),
            date: Utc.with_ymd_and_hms(2021, 9, 26, 21, 0, 0).unwrap()
                - chrono::Duration::seconds(i as i64),
            author: "Jane Doe <jane@example.com>".to_string(),
        }
    }

    /// Store with four cached commits so the CLI path answers from cache
    /// without touching git.
    async fn seeded_store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::memory().await.unwrap());
        let repo_url = GitHubConfig::default().repo_url("o", "r");
        for i in 0..4 {
            store.insert_if_absent(&repo_url, &record(i)).await.unwrap();
        }
        store
    }

    fn one_shot_policy() -> ResilienceConfig {
        ResilienceConfig {
            attempts: 1,
            attempt_timeout_secs: 5,
            backoff_ms: 0,
        }
    }

    async fn coordinator(
        source: Arc<dyn CommitSource>,
        policy: ResilienceConfig,
        force_use_cli: bool,
    ) -> CommitService {
        let api_store = Arc::new(SqliteStore::memory().await.unwrap());
        let api = ApiCommitService::new(source, api_store, GitHubConfig::default());
        let cli = CliCommitService::new(
            seeded_store().await as Arc<dyn CommitStore>,
            GitHubConfig::default(),
            CloneConfig::default(),
        );
        CommitService::new(api, cli, policy, force_use_cli)
    }

    #[tokio::test]
    async fn not_found_never_triggers_the_clone_path() {
        let source = FailSource::new(|| Error::NotFound {
            repo: "https://github.com/o/r".into(),
        });
        let service =
            coordinator(Arc::clone(&source) as Arc<dyn CommitSource>, one_shot_policy(), false)
                .await;

        // The CLI path would answer from its cache, so an Ok here would
        // mean the fallback (wrongly) ran.
        let err = service.commit_page("o", "r", 1, 10).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn upstream_failure_falls_back_to_the_clone_path() {
        let source = FailSource::new(|| Error::upstream("connection reset"));
        let service =
            coordinator(Arc::clone(&source) as Arc<dyn CommitSource>, one_shot_policy(), false)
                .await;

        let page = service.commit_page("o", "r", 1, 10).await.unwrap();
        assert_eq!(page.count, 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn policy_retries_the_api_path_before_falling_back() {
        let source = FailSource::new(|| Error::upstream("connection reset"));
        let policy = ResilienceConfig {
            attempts: 2,
            attempt_timeout_secs: 5,
            backoff_ms: 0,
        };
        let service =
            coordinator(Arc::clone(&source) as Arc<dyn CommitSource>, policy, false).await;

        let page = service.commit_page("o", "r", 1, 10).await.unwrap();
        assert_eq!(page.count, 4);
        // One reconciler probe per attempt.
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn force_use_cli_skips_the_api_path_entirely() {
        let source = FailSource::new(|| Error::upstream("should never be called"));
        let service =
            coordinator(Arc::clone(&source) as Arc<dyn CommitSource>, one_shot_policy(), true)
                .await;

        let page = service.commit_page("o", "r", 1, 10).await.unwrap();
        assert_eq!(page.count, 4);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn with_policy_retries_until_success() {
        let calls = AtomicUsize::new(0);
        let policy = ResilienceConfig {
            attempts: 3,
            attempt_timeout_secs: 5,
            backoff_ms: 0,
        };

        let result = with_policy(policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::upstream("flaky"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_policy_does_not_retry_fatal_kinds() {
        let calls = AtomicUsize::new(0);
        let policy = ResilienceConfig {
            attempts: 3,
            attempt_timeout_secs: 5,
            backoff_ms: 0,
        };

        let result: Result<()> = with_policy(policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::protocol("bad hint")) }
        })
        .await;

        assert!(matches!(result.unwrap_err(), Error::Protocol { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_policy_times_out_slow_attempts() {
        let policy = ResilienceConfig {
            attempts: 1,
            attempt_timeout_secs: 0,
            backoff_ms: 0,
        };

        let result: Result<()> =
            with_policy(policy, || std::future::pending::<Result<()>>()).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout { .. }));
    }
}

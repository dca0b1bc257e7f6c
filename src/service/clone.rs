//! Clone-backed retrieval orchestrator.
//!
//! Same responsibilities as the remote path, different source: check the
//! cache, otherwise clone the repository into an ephemeral workspace and
//! parse its log.  Full-history persistence runs as a background task
//! concurrent with extracting the requested page (both only read the
//! cloned tree); the call is not complete until that task has been joined,
//! because returning earlier would make the cache-hit check unreliable for
//! subsequent requests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{CloneConfig, GitHubConfig};
use crate::error::{Error, Result};
use crate::gitcli::{self, Workspace};
use crate::model::CommitPage;
use crate::normalize;
use crate::store::CommitStore;

pub struct CliCommitService {
    store: Arc<dyn CommitStore>,
    github: GitHubConfig,
    clone: CloneConfig,
}

impl CliCommitService {
    pub fn new(store: Arc<dyn CommitStore>, github: GitHubConfig, clone: CloneConfig) -> Self {
        Self {
            store,
            github,
            clone,
        }
    }

    pub async fn commit_page(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CommitPage> {
        let repo_url = self.github.repo_url(owner, repo);

        let cached = self.store.count_by_repo(&repo_url).await?;
        if cached > 0 {
            info!(%repo_url, total = cached, "serving commit page from cache");
            let items = self.store.find_page(&repo_url, page, per_page).await?;
            return Ok(CommitPage::new(items, page, per_page, cached));
        }

        info!(%repo_url, "no cached data, cloning repository");
        let workspace = Workspace::create()?;
        let repo_dir = gitcli::clone_no_checkout(&workspace, &repo_url, repo).await?;

        let total = gitcli::rev_list_count(&repo_dir).await?;
        debug!(total, "repository cloned");

        let mut persist = tokio::spawn(persist_full_history(
            Arc::clone(&self.store),
            repo_dir.clone(),
            repo_url.clone(),
            total,
        ));

        let items = match self.extract_page(&repo_dir, page, per_page).await {
            Ok(items) => items,
            Err(e) => {
                persist.abort();
                return Err(e);
            }
        };

        let timeout = Duration::from_secs(self.clone.persist_timeout_secs);
        match tokio::time::timeout(timeout, &mut persist).await {
            Err(_) => {
                persist.abort();
                return Err(Error::Timeout {
                    detail: format!(
                        "full-history persistence did not finish within {}s",
                        self.clone.persist_timeout_secs,
                    ),
                });
            }
            Ok(Err(join_err)) => {
                return Err(Error::upstream(format!(
                    "full-history persistence task failed: {join_err}"
                )));
            }
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Ok(Ok(()))) => {}
        }

        Ok(CommitPage::new(items, page, per_page, total))
    }

    async fn extract_page(
        &self,
        repo_dir: &std::path::Path,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<crate::model::CommitRecord>> {
        let output = gitcli::log_page(repo_dir, page, per_page).await?;
        normalize::parse_log_output(&output)
    }
}

/// Parse the whole cloned history and persist it idempotently.
///
/// The parsed record count must match the `rev-list --count` ground truth;
/// a mismatch means the sentinel framing mangled at least one record, and
/// persisting a silently gapped history would poison the cache.
async fn persist_full_history(
    store: Arc<dyn CommitStore>,
    repo_dir: PathBuf,
    repo_url: String,
    expected_total: u64,
) -> Result<()> {
    let output = gitcli::log_all(&repo_dir).await?;
    let records = normalize::parse_log_output(&output)?;

    if records.len() as u64 != expected_total {
        return Err(Error::protocol(format!(
            "parsed {} git log records but rev-list counts {expected_total}",
            records.len(),
        )));
    }

    for record in &records {
        store.insert_if_absent(&repo_url, record).await?;
    }

    debug!(persisted = records.len(), %repo_url, "full history persisted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

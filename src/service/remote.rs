//! Remote-backed retrieval orchestrator.
//!
//! Cache-hit requests are served straight from the store and never touch
//! the GitHub API.  A cold repository triggers a full sequential walk of
//! its history: reconcile the total, bound the walk, persist every page,
//! and retain the requested page as the result.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::github::CommitSource;
use crate::model::{pages_for, CommitPage};
use crate::reconcile;
use crate::store::CommitStore;

pub struct ApiCommitService {
    source: Arc<dyn CommitSource>,
    store: Arc<dyn CommitStore>,
    github: GitHubConfig,
}

impl ApiCommitService {
    pub fn new(
        source: Arc<dyn CommitSource>,
        store: Arc<dyn CommitStore>,
        github: GitHubConfig,
    ) -> Self {
        Self {
            source,
            store,
            github,
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

        info!(%repo_url, "no cached data, cold-fetching from GitHub API");
        self.cold_fetch(owner, repo, &repo_url, page, per_page).await
    }

    /// Walk the whole remote history sequentially, persisting each page and
    /// retaining the requested one.  Ordering matters: the retained page and
    /// the reconciled total only stay consistent because pages arrive in
    /// order.  A per-page failure aborts the walk; pages persisted so far
    /// are left in place.
    async fn cold_fetch(
        &self,
        owner: &str,
        repo: &str,
        repo_url: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CommitPage> {
        let total = reconcile::reconcile_total(self.source.as_ref(), owner, repo, per_page).await?;
        let total_pages = pages_for(total, per_page);

        if total_pages > self.github.max_pages {
            return Err(Error::ResourceExhausted {
                detail: format!(
                    "cold fetch needs {total_pages} GitHub API pages, above the configured maximum of {}",
                    self.github.max_pages,
                ),
            });
        }

        let mut retained = Vec::new();
        for walk_page in 1..=total_pages {
            let batch = self
                .source
                .fetch_page(owner, repo, walk_page, per_page)
                .await?;

            for record in &batch.records {
                self.store.insert_if_absent(repo_url, record).await?;
            }

            if walk_page == page {
                retained = batch.records;
            }
        }

        debug!(total, total_pages, "cold fetch complete");
        Ok(CommitPage::new(retained, page, per_page, total))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

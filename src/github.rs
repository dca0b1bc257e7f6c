//! GitHub commits API adapter.
//!
//! Implements the [`CommitSource`] seam over the paged
//! `GET /repos/{owner}/{repo}/commits` endpoint.  Failure classification
//! happens here, at the boundary: HTTP statuses are mapped onto the error
//! taxonomy so that no GitHub-specific knowledge leaks into the
//! orchestrator or the fallback coordinator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::model::CommitRecord;
use crate::normalize;

// ---------------------------------------------------------------------------
// Source seam
// ---------------------------------------------------------------------------

/// One fetched page, plus the pagination hint the count reconciler needs.
#[derive(Debug, Clone)]
pub struct PageBatch {
    /// Normalised records for this page, newest first.
    pub records: Vec<CommitRecord>,
    /// URL of the `rel="last"` Link relation, when the response carried one.
    pub last_link: Option<String>,
}

/// Abstraction over the paged remote commit listing.
#[async_trait]
pub trait CommitSource: Send + Sync {
    async fn fetch_page(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageBatch>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ApiCommit {
    pub sha: String,
    pub commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiCommitDetail {
    pub message: String,
    pub author: ApiAuthor,
}

#[derive(Debug, Deserialize)]
pub struct ApiAuthor {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    base_url: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, config: &GitHubConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            base_url: config.base_url.clone(),
        }
    }

    /// Issue the paged GET and classify non-success statuses.
    async fn get_commits(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/repos/{owner}/{repo}/commits", self.api_url);

        debug!(%url, page, per_page, "calling GitHub API");

        let resp = self
            .http
            .get(&url)
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        detail: format!("GitHub API request timed out: {url}"),
                    }
                } else {
                    Error::Upstream(anyhow::Error::new(e).context("GitHub API request failed"))
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                repo: format!("{}{}/{}", self.base_url, owner, repo),
            });
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            if body.contains("rate limit exceeded") {
                return Err(Error::ResourceExhausted {
                    detail: "GitHub API rate limit exceeded".to_string(),
                });
            }
            warn!(%status, "GitHub API returned 403 without a rate-limit message");
            return Err(Error::upstream(format!(
                "GitHub API returned {status} for {owner}/{repo}"
            )));
        }
        if !status.is_success() {
            return Err(Error::upstream(format!(
                "GitHub API returned {status} for {owner}/{repo}"
            )));
        }

        Ok(resp)
    }
}

#[async_trait]
impl CommitSource for GitHubClient {
    async fn fetch_page(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageBatch> {
        let resp = self.get_commits(owner, repo, page, per_page).await?;

        let last_link = resp
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_link_last);

        let commits: Vec<ApiCommit> = resp.json().await.map_err(|e| {
            Error::protocol(format!("failed to decode GitHub API commits response: {e}"))
        })?;

        Ok(PageBatch {
            records: commits.into_iter().map(normalize::record_from_api).collect(),
            last_link,
        })
    }
}

// ---------------------------------------------------------------------------
// Link header parsing
// ---------------------------------------------------------------------------

/// Extract the URL of the `rel="last"` relation from a `Link` header value.
///
/// GitHub sends e.g.
/// `<https://api.github.com/...?page=2&per_page=10>; rel="next",
///  <https://api.github.com/...?page=7&per_page=10>; rel="last"`.
pub fn parse_link_last(header: &str) -> Option<String> {
    for part in header.split(',') {
        let mut pieces = part.splitn(2, ';');
        let url = pieces.next().unwrap_or("").trim();
        let params = pieces.next().unwrap_or("");
        if params.contains("rel=\"last\"") {
            return Some(
                url.trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            );
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

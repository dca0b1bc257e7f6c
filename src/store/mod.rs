//! Durable commit cache consumed by both retrieval paths.

pub mod sqlite;

pub use self::sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::CommitRecord;

/// Key-value-like store keyed by `(repository identity, sha)`.
///
/// Each call is individually consistent; no cross-call transaction spans a
/// cold-fetch walk (a mid-walk failure leaves already-persisted pages in
/// place).  Concurrent duplicate inserts of the same key must be safe
/// no-ops.
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// Number of cached commits under this repository identity.
    async fn count_by_repo(&self, repo_url: &str) -> Result<u64>;

    /// One page of cached commits, authored-at descending, 1-based `page`.
    async fn find_page(
        &self,
        repo_url: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CommitRecord>>;

    /// Insert a record unless `(repo_url, sha)` already exists.
    async fn insert_if_absent(&self, repo_url: &str, record: &CommitRecord) -> Result<()>;
}

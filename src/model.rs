//! Canonical commit record and page shapes served by both retrieval paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Commit record
// ---------------------------------------------------------------------------

/// One commit, normalised from either the GitHub API shape or a git CLI log
/// record.  Immutable once persisted; `sha` is unique within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    /// Full message: subject, or subject + blank line + body.
    pub message: String,
    /// Author timestamp, normalised to UTC.
    pub date: DateTime<Utc>,
    /// `"Name <email>"`.
    pub author: String,
}

// ---------------------------------------------------------------------------
// Commit page
// ---------------------------------------------------------------------------

/// One page of commit history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct CommitPage {
    pub items: Vec<CommitRecord>,
    pub page: u32,
    pub per_page: u32,
    /// Number of items on this page.
    pub count: usize,
    /// Total number of commits in the repository.
    pub total: u64,
    pub total_pages: u32,
}

impl CommitPage {
    pub fn new(items: Vec<CommitRecord>, page: u32, per_page: u32, total: u64) -> Self {
        Self {
            count: items.len(),
            total_pages: pages_for(total, per_page),
            items,
            page,
            per_page,
            total,
        }
    }
}

/// `ceil(total / per_page)` without going through floats.
pub fn pages_for(total: u64, per_page: u32) -> u32 {
    total.div_ceil(per_page as u64) as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! SQLite-backed commit store.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::CommitRecord;
use crate::store::CommitStore;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and run migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Upstream(anyhow::Error::new(e).context(format!(
                        "failed to create database directory: {}",
                        parent.display()
                    ))))?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent
            // inserts from the background persistence task.
            .busy_timeout(Duration::from_secs(5));

        let store = Self::from_options(opts).await?;
        info!(path = %path.display(), "commit store ready");
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub async fn memory() -> Result<Self> {
        Self::from_options(SqliteConnectOptions::new().in_memory(true)).await
    }

    async fn from_options(opts: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent lock failures under concurrent inserts.
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(db_error)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS commits (
                repository TEXT NOT NULL,
                sha        TEXT NOT NULL,
                message    TEXT NOT NULL,
                date       INTEGER NOT NULL,
                author     TEXT NOT NULL,
                PRIMARY KEY (repository, sha)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_commits_repo_date
             ON commits (repository, date DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

#[async_trait]
impl CommitStore for SqliteStore {
    async fn count_by_repo(&self, repo_url: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM commits WHERE repository = ?")
                .bind(repo_url)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(count as u64)
    }

    async fn find_page(
        &self,
        repo_url: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CommitRecord>> {
        let offset = (page as i64 - 1) * per_page as i64;

        // Tie-break on sha so offset pagination is a total order: without it,
        // commits sharing a timestamp could duplicate or vanish across pages.
        let rows = sqlx::query(
            "SELECT sha, message, date, author FROM commits
             WHERE repository = ?
             ORDER BY date DESC, sha
             LIMIT ? OFFSET ?",
        )
        .bind(repo_url)
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|row| {
                let ts: i64 = row.get("date");
                let date = DateTime::from_timestamp(ts, 0)
                    .ok_or_else(|| Error::upstream(format!("corrupt commit date: {ts}")))?;
                Ok(CommitRecord {
                    sha: row.get("sha"),
                    message: row.get("message"),
                    date,
                    author: row.get("author"),
                })
            })
            .collect()
    }

    async fn insert_if_absent(&self, repo_url: &str, record: &CommitRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO commits (repository, sha, message, date, author)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(repo_url)
        .bind(&record.sha)
        .bind(&record.message)
        .bind(record.date.timestamp())
        .bind(&record.author)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> Error {
    Error::Upstream(anyhow::Error::new(e).context("commit store query failed"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const REPO: &str = "https://github.com/pcarrasqueira/commit-viewer-test";

    fn record(sha: &str, seconds_ago: u32) -> CommitRecord {
        CommitRecord {
            sha: sha.to_string(),
            message: format!("commit {sha}"),
            date: Utc.with_ymd_and_hms(2021, 9, 26, 21, 55, 26).unwrap()
                - chrono::Duration::seconds(seconds_ago as i64),
            author: "Paulo Carrasqueira <pjcarrasqueira@gmail.com>".to_string(),
        }
    }

    async fn seeded_store(count: u32) -> SqliteStore {
        let store = SqliteStore::memory().await.unwrap();
        // sha-0 is the newest commit.
        for i in 0..count {
            store
                .insert_if_absent(REPO, &record(&format!("sha-{i}"), i))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_no_op() {
        let store = SqliteStore::memory().await.unwrap();
        let commit = record("abc123", 0);

        store.insert_if_absent(REPO, &commit).await.unwrap();
        store.insert_if_absent(REPO, &commit).await.unwrap();

        assert_eq!(store.count_by_repo(REPO).await.unwrap(), 1);
        let page = store.find_page(REPO, 1, 10).await.unwrap();
        assert_eq!(page, vec![commit]);
    }

    #[tokio::test]
    async fn count_is_partitioned_by_repository() {
        let store = seeded_store(3).await;
        assert_eq!(store.count_by_repo(REPO).await.unwrap(), 3);
        assert_eq!(
            store
                .count_by_repo("https://github.com/other/repo")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn pages_are_date_descending() {
        let store = seeded_store(4).await;
        let page = store.find_page(REPO, 1, 3).await.unwrap();
        let shas: Vec<_> = page.iter().map(|r| r.sha.as_str()).collect();
        assert_eq!(shas, ["sha-0", "sha-1", "sha-2"]);
    }

    #[tokio::test]
    async fn concatenated_pages_reproduce_history_without_gaps() {
        let store = seeded_store(10).await;

        let mut all = Vec::new();
        for page in 1..=4 {
            all.extend(store.find_page(REPO, page, 3).await.unwrap());
        }

        assert_eq!(all.len(), 10);
        let mut seen = std::collections::HashSet::new();
        for record in &all {
            assert!(seen.insert(record.sha.clone()), "duplicate {}", record.sha);
        }
        for window in all.windows(2) {
            assert!(window[0].date >= window[1].date);
        }
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let store = seeded_store(4).await;
        assert!(store.find_page(REPO, 3, 3).await.unwrap().is_empty());
    }
}

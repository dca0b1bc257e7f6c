//! Normalisation of both commit source shapes into [`CommitRecord`].
//!
//! The API path maps the provider's nested commit object; the CLI path
//! parses sentinel-delimited `git log` records.  Both paths must produce
//! byte-identical records for the same commit, or the idempotent cache
//! insert stops being a no-op.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::github::ApiCommit;
use crate::model::CommitRecord;

/// Field delimiter for the CLI log format.  Three characters unlikely to
/// appear in free text; a collision with real commit content corrupts
/// parsing and fails the whole batch via the field-count check.
pub const SENTINEL: &str = "|||";

/// `git log --pretty` format producing one sentinel-framed record per
/// commit: hash, subject, body, ISO-8601 author date, `Name <email>`.
pub const LOG_FORMAT: &str = "%H|||%s|||%b|||%aI|||%an <%ae>|||";

// ---------------------------------------------------------------------------
// API shape
// ---------------------------------------------------------------------------

/// Map a GitHub API commit object to the canonical record.
pub fn record_from_api(commit: ApiCommit) -> CommitRecord {
    CommitRecord {
        sha: commit.sha,
        message: commit.commit.message,
        date: commit.commit.author.date,
        author: format!(
            "{} <{}>",
            commit.commit.author.name, commit.commit.author.email
        ),
    }
}

// ---------------------------------------------------------------------------
// CLI shape: framing
// ---------------------------------------------------------------------------

/// Re-join raw `git log` output lines into logical records.
///
/// A record is only complete once a physical line ending with the trailing
/// sentinel is seen; body lines in between are re-joined with `\n`.  A
/// trailing buffer with no closing sentinel is not a complete record and is
/// discarded (the clone path's count validation catches the gap).
pub fn frame_log_records(output: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut pending = String::new();

    for line in output.lines() {
        if pending.is_empty() {
            if line.ends_with(SENTINEL) && !line.starts_with(SENTINEL) {
                records.push(line.to_string());
            } else {
                pending.push_str(line);
            }
        } else {
            pending.push('\n');
            pending.push_str(line);
            if line.ends_with(SENTINEL) {
                records.push(std::mem::take(&mut pending));
            }
        }
    }

    records
}

// ---------------------------------------------------------------------------
// CLI shape: record parsing
// ---------------------------------------------------------------------------

/// Parse one framed log record into the canonical record.
///
/// Field order: hash, subject, body, ISO-8601 offset date-time,
/// `Name <email>`.  A wrong field count is fatal: one misparsed commit
/// cannot be skipped without risking a silent gap in history.
pub fn parse_log_record(record: &str) -> Result<CommitRecord> {
    let stripped = record
        .strip_suffix(SENTINEL)
        .ok_or_else(|| Error::protocol("git log record missing trailing sentinel"))?;

    let fields: Vec<&str> = stripped.split(SENTINEL).collect();
    if fields.len() != 5 {
        return Err(Error::protocol(format!(
            "git log record has {} fields, expected 5",
            fields.len()
        )));
    }

    let date = DateTime::parse_from_rfc3339(fields[3])
        .map_err(|e| Error::protocol(format!("invalid commit date {:?}: {e}", fields[3])))?
        .with_timezone(&Utc);

    // `%b` carries a trailing newline when a body is present; strip it so
    // both source shapes produce the same message text.
    let subject = fields[1];
    let body = fields[2].trim_end_matches('\n');
    let message = if body.is_empty() {
        subject.to_string()
    } else {
        format!("{subject}\n\n{body}")
    };

    Ok(CommitRecord {
        sha: fields[0].to_string(),
        message,
        date,
        author: fields[4].to_string(),
    })
}

/// Parse a whole `git log` output into records, failing the batch on the
/// first malformed record.
pub fn parse_log_output(output: &str) -> Result<Vec<CommitRecord>> {
    frame_log_records(output)
        .iter()
        .map(|record| parse_log_record(record))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

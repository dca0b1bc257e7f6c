//! Total-commit-count reconciliation from paging metadata.
//!
//! The commits endpoint never reports a total; it only points at the last
//! page through the `Link` header.  Two probes recover the exact count
//! without walking the whole history: page 1 gives the hint, the last page
//! gives the remainder.

use tracing::debug;

use crate::error::{Error, Result};
use crate::github::CommitSource;

/// Determine the exact total commit count with at most two remote probes.
///
/// No hint means page 1 is the only page.  A hint that cannot be parsed is
/// a protocol error; guessing would make the cold-fetch walk inconsistent
/// with the persisted records.
pub async fn reconcile_total(
    source: &dyn CommitSource,
    owner: &str,
    repo: &str,
    per_page: u32,
) -> Result<u64> {
    let first = source.fetch_page(owner, repo, 1, per_page).await?;
    let first_page_items = first.records.len() as u64;

    let Some(link) = first.last_link else {
        debug!(total = first_page_items, "no last-page hint, history fits one page");
        return Ok(first_page_items);
    };

    let last_page = parse_last_page(&link).ok_or_else(|| {
        Error::protocol(format!("unparsable last-page hint in Link header: {link}"))
    })?;
    if last_page < 1 {
        return Err(Error::protocol(format!(
            "last-page hint points at page {last_page}"
        )));
    }

    let last = source.fetch_page(owner, repo, last_page, per_page).await?;
    let last_page_items = last.records.len() as u64;

    let total = (last_page as u64 - 1) * per_page as u64 + last_page_items;
    debug!(last_page, last_page_items, total, "reconciled total from pagination hint");
    Ok(total)
}

/// Parse the page number embedded in a `rel="last"` URL: the digits
/// following the first `page=` marker, up to the following `&` (or the end
/// of the string).  The hint format is not assumed stable beyond that.
fn parse_last_page(link: &str) -> Option<u32> {
    let idx = link.find("page=")?;
    let rest = &link[idx + "page=".len()..];
    rest.split('&').next()?.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

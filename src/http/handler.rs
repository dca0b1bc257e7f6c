//! Main axum router and HTTP request handlers.
//!
//! Routes:
//! - `GET /commit-viewer/{user}/{repository}` - paginated commit history
//! - `GET /healthz`                           - health check
//!
//! Validation happens here so that every downstream failure already carries
//! a taxonomy kind; the stable status/code/message triple is rendered by
//! [`AppError`].

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::error::Error;
use crate::AppState;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PER_PAGE: u32 = 10;
const MAX_PER_PAGE: u32 = 100;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/commit-viewer/{user}/{repository}",
            get(handle_commit_list),
        )
        .route("/healthz", get(handle_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query parameter types
// ---------------------------------------------------------------------------

/// Raw query strings; parsed by hand so that a malformed value maps to the
/// stable bad-request triple instead of axum's default rejection.
#[derive(Debug, Deserialize)]
struct CommitListQuery {
    page: Option<String>,
    per_page: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /commit-viewer/{user}/{repository}?page=1&per_page=10`
#[instrument(skip(state, query), fields(%user, %repository))]
async fn handle_commit_list(
    State(state): State<Arc<AppState>>,
    Path((user, repository)): Path<(String, String)>,
    Query(query): Query<CommitListQuery>,
) -> Result<Response, AppError> {
    let page = parse_param("page", query.page.as_deref(), DEFAULT_PAGE)?;
    let per_page = parse_param("per_page", query.per_page.as_deref(), DEFAULT_PER_PAGE)?;
    if per_page > MAX_PER_PAGE {
        return Err(AppError(Error::BadRequest {
            detail: format!("per_page must be at most {MAX_PER_PAGE}, got {per_page}"),
        }));
    }

    let commit_page = state
        .service
        .commit_page(&user, &repository, page, per_page)
        .await?;

    Ok((StatusCode::OK, Json(commit_page)).into_response())
}

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    crate::health::health_handler(&state).await
}

// ---------------------------------------------------------------------------
// Parameter parsing
// ---------------------------------------------------------------------------

/// Parse a positive integer query parameter, falling back to `default` when
/// absent.
fn parse_param(name: &str, value: Option<&str>, default: u32) -> Result<u32, AppError> {
    let Some(value) = value else {
        return Ok(default);
    };

    match value.parse::<i64>() {
        Ok(n) if n >= 1 && n <= u32::MAX as i64 => Ok(n as u32),
        _ => Err(AppError(Error::BadRequest {
            detail: format!("{name} must be a positive integer, got {value:?}"),
        })),
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Wraps the taxonomy error into its stable HTTP representation.
#[derive(Debug)]
pub struct AppError(pub Error);

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = self.0;
        if let Error::Upstream(ref cause) = err {
            error!(error = %cause, "request failed with an unclassified error");
        }

        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            code: err.code(),
            message: err.message(),
            description: Some(err.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_params_use_defaults() {
        assert_eq!(parse_param("page", None, DEFAULT_PAGE).unwrap(), 1);
        assert_eq!(parse_param("per_page", None, DEFAULT_PER_PAGE).unwrap(), 10);
    }

    #[test]
    fn negative_and_zero_params_are_rejected() {
        for value in ["-1", "0"] {
            let err = parse_param("page", Some(value), 1).unwrap_err();
            assert_eq!(err.0.code(), "3");
            assert_eq!(err.0.http_status(), 400);
        }
    }

    #[test]
    fn non_numeric_params_are_rejected() {
        assert!(parse_param("page", Some("ten"), 1).is_err());
        assert!(parse_param("page", Some("1.5"), 1).is_err());
        assert!(parse_param("page", Some(""), 1).is_err());
    }

    #[test]
    fn valid_params_pass_through() {
        assert_eq!(parse_param("per_page", Some("100"), 10).unwrap(), 100);
        assert_eq!(parse_param("page", Some("7"), 1).unwrap(), 7);
    }
}

//! HTTP layer for the commit history service.
//!
//! A thin axum router over the fallback coordinator: parameter validation,
//! content negotiation, and the stable error-triple mapping live here; all
//! retrieval logic stays in `service`.

pub mod handler;

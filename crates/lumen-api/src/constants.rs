//! API constants

/// Prefix every route is nested under.
pub const API_PREFIX: &str = "/api";

/// Request bodies are tiny JSON documents; anything larger is rejected.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Default for `HTTP_CONCURRENCY_LIMIT`.
pub const DEFAULT_HTTP_CONCURRENCY_LIMIT: usize = 1024;

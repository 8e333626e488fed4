//! Lumen API Library
//!
//! This crate provides the HTTP handlers and application setup that sit in
//! front of the scan queue.

pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;
mod validation;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;

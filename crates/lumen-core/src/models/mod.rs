//! Data models for the application
//!
//! Tasks carry the lifecycle state of one scan request; issues are the
//! findings the scanner reports for it.

mod issue;
mod task;

pub use issue::*;
pub use task::*;

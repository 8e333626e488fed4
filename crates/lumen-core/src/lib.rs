//! Lumen Core Library
//!
//! This crate provides the domain models, error types, configuration and the
//! scan collaborator traits shared by the worker, scanner and API crates.

pub mod config;
pub mod error;
pub mod models;
pub mod queue_error;
pub mod scan;

// Re-export commonly used types
pub use config::{resolve_server_addr, BaseConfig, Config, ScanConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use queue_error::{QueueError, RegistryError};
pub use scan::{ReachabilityCheck, ReachabilityError, ScanError, ScanExecutor};

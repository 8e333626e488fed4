//! Lumen Scanner Library
//!
//! This crate provides the concrete scan collaborators used by the worker.
//!
//! [`Pa11yExecutor`] runs the pa11y command line tool and parses its JSON
//! reporter output; [`HttpReachabilityChecker`] checks a URL with a bounded
//! GET before the worker commits to a full scan.

mod pa11y;
mod reachability;

pub use pa11y::{Pa11yExecutor, ISSUES_FOUND_EXIT_CODE};
pub use reachability::{validate_target, HttpReachabilityChecker};

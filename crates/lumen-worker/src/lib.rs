//! Lumen Worker Library
//!
//! This crate provides the task registry, the scan queue and the worker pool.
//!
//! Producers call [`TaskRegistry::create`], which stores the task and pushes
//! its id onto a bounded queue. [`TaskWorker`] loops drain the queue, drive each
//! task through `pending -> processing -> completed | failed` and write the
//! outcome back to the registry. The queue only ever carries ids; the registry
//! is the single source of truth for task state.

mod queue;
mod registry;
mod worker;

pub use queue::{task_channel, TaskReceiver, TaskSender};
pub use registry::TaskRegistry;
pub use worker::{TaskWorker, WorkerConfig, WorkerHandle};

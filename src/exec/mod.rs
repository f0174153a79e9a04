// src/exec/mod.rs

//! Running scheduled tasks.
//!
//! The runtime only sees [`ExecutorBackend`]. Behind [`LocalBackend`] sit
//! the executor loop (concurrency bound, termination) and the per-attempt
//! runner; [`launcher`] is how stages reach external binaries, either
//! directly or through a batch queue.

pub mod backend;
pub mod executor_loop;
pub mod launcher;
pub mod task_runner;

pub use backend::{BackendFuture, ExecutionEnv, ExecutorBackend, LocalBackend};
pub use launcher::{CommandLauncher, DirectLauncher, ExternalCommand, GridLauncher, GridProfile};

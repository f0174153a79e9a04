// src/dag/mod.rs

//! The task graph and the per-run scheduler built on top of it.
//!
//! A [`DagGraph`] is immutable once handed to a [`Scheduler`]. The scheduler
//! keeps run state in [`state_manager`] and reports every transition as a
//! [`SchedulerStep`].

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{DagGraph, EdgeKind, TaskSpec};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{ScheduledTask, TaskRunState};

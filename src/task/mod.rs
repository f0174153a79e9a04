// src/task/mod.rs

//! The unit of work scheduled by the DAG.
//!
//! - [`Task`] is the run contract every stage implements.
//! - [`InputBinding`] declares where a task's inputs come from; the scheduler
//!   turns bindings into [`ResolvedInput`]s once all producers succeeded.
//! - [`TaskOutput`] is what a task hands back: handles, never bytes.
//! - [`context`] holds the per-attempt [`TaskContext`].
//! - [`resources`] holds the advisory [`ResourceHints`].

pub mod context;
pub mod resources;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::engine::TaskId;
use crate::errors::Result;
use crate::stages::StageKind;
use crate::store::ArtifactHandle;

pub use context::TaskContext;
pub use resources::{ByteSize, ResourceHints};

/// Boxed, sendable future used at the trait seams (tasks, launchers,
/// executor backends).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A schedulable unit of work.
///
/// `run` is called exactly once per execution attempt, with every input
/// already resolved in `ctx`. Errors must be returned, not swallowed: the
/// scheduler alone decides what a failure means for the rest of the graph.
pub trait Task: Send + Sync + fmt::Debug {
    /// Which pipeline stage this task implements.
    fn kind(&self) -> StageKind;

    fn resources(&self) -> ResourceHints {
        ResourceHints::default()
    }

    fn run<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, Result<TaskOutput>>;
}

/// Identifier distinguishing one fan-out branch from another (e.g. a
/// chromosome).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        PartitionKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyed collection of handles produced by one task, optionally tagged with
/// the partition it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArtifactRecord {
    pub partition: Option<PartitionKey>,
    pub artifacts: BTreeMap<String, ArtifactHandle>,
}

impl ArtifactRecord {
    pub fn for_partition(partition: PartitionKey) -> Self {
        Self {
            partition: Some(partition),
            artifacts: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, handle: ArtifactHandle) -> Self {
        self.artifacts.insert(name.into(), handle);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactHandle> {
        self.artifacts.get(name)
    }
}

/// Result of a successful task run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutput {
    Artifact(ArtifactHandle),
    Record(ArtifactRecord),
}

impl TaskOutput {
    /// The single handle, if this output is one.
    pub fn as_artifact(&self) -> Option<&ArtifactHandle> {
        match self {
            TaskOutput::Artifact(handle) => Some(handle),
            TaskOutput::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&ArtifactRecord> {
        match self {
            TaskOutput::Record(record) => Some(record),
            TaskOutput::Artifact(_) => None,
        }
    }

    /// Every handle carried by this output.
    pub fn handles(&self) -> Vec<&ArtifactHandle> {
        match self {
            TaskOutput::Artifact(handle) => vec![handle],
            TaskOutput::Record(record) => record.artifacts.values().collect(),
        }
    }
}

/// Where a named task input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputBinding {
    /// A value fixed at graph construction time.
    Literal(String),
    /// The output of one upstream task.
    Output(TaskId),
    /// The outputs of several upstream tasks, in this order. Used for
    /// fan-in: all of them must have succeeded.
    Collect(Vec<TaskId>),
}

impl InputBinding {
    pub fn literal(value: impl fmt::Display) -> Self {
        InputBinding::Literal(value.to_string())
    }

    /// Upstream tasks this binding reads from.
    pub fn producers(&self) -> Vec<TaskId> {
        match self {
            InputBinding::Literal(_) => Vec::new(),
            InputBinding::Output(id) => vec![*id],
            InputBinding::Collect(ids) => ids.clone(),
        }
    }
}

/// An input binding after its producers finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInput {
    Literal(String),
    Output(TaskOutput),
    Collected(Vec<TaskOutput>),
}

/// Resolved inputs keyed by parameter name.
pub type ResolvedInputs = BTreeMap<String, ResolvedInput>;

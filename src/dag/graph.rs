// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::engine::TaskId;
use crate::errors::{PipelineError, Result};
use crate::task::{InputBinding, Task};

/// Kind of dependency between two tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// The target runs once the source succeeded.
    Child,
    /// The target runs once the source *and everything reachable from its
    /// children* succeeded (subgraph-completion barrier).
    FollowOn,
}

/// A task as declared by a pipeline definition: display name, the task
/// implementation and its input bindings.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub task: Arc<dyn Task>,
    pub bindings: BTreeMap<String, InputBinding>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            task,
            bindings: BTreeMap::new(),
        }
    }

    pub fn bind(mut self, input: impl Into<String>, binding: InputBinding) -> Self {
        self.bindings.insert(input.into(), binding);
        self
    }
}

#[derive(Debug, Clone)]
struct DagNode {
    spec: TaskSpec,
    /// Incoming edges.
    parents: Vec<(TaskId, EdgeKind)>,
    /// Outgoing edges.
    successors: Vec<(TaskId, EdgeKind)>,
}

/// Directed acyclic graph of tasks with child and follow-on edges.
///
/// Built once by a pipeline definition and frozen before execution. Every
/// edge insertion is checked: an edge that would make the graph wait on
/// itself is rejected with [`PipelineError::Cycle`] and leaves the graph
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: Vec<DagNode>,
}

impl DagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, spec: TaskSpec) -> TaskId {
        let id = TaskId::new(self.nodes.len());
        debug!(task = %spec.name, id = %id, "adding task to graph");
        self.nodes.push(DagNode {
            spec,
            parents: Vec::new(),
            successors: Vec::new(),
        });
        id
    }

    /// `to` consumes `from`'s output and may run once `from` succeeded.
    pub fn add_child(&mut self, from: TaskId, to: TaskId) -> Result<()> {
        self.add_edge(from, to, EdgeKind::Child)
    }

    /// `to` may run only once `from` and its whole subgraph succeeded.
    pub fn add_follow_on(&mut self, from: TaskId, to: TaskId) -> Result<()> {
        self.add_edge(from, to, EdgeKind::FollowOn)
    }

    fn add_edge(&mut self, from: TaskId, to: TaskId, kind: EdgeKind) -> Result<()> {
        self.ensure_known(from)?;
        self.ensure_known(to)?;

        if from == to {
            return Err(PipelineError::Cycle(format!(
                "task '{}' cannot depend on itself",
                self.name_of(from)
            )));
        }

        if self.nodes[from.index()].successors.contains(&(to, kind)) {
            return Ok(());
        }

        self.nodes[from.index()].successors.push((to, kind));
        self.nodes[to.index()].parents.push((from, kind));

        if let Some(culprit) = self.find_gate_cycle() {
            // Roll back so a rejected edge leaves no trace.
            self.nodes[from.index()].successors.pop();
            self.nodes[to.index()].parents.pop();
            return Err(PipelineError::Cycle(format!(
                "{kind:?} edge '{}' -> '{}' would make task '{}' wait on itself",
                self.name_of(from),
                self.name_of(to),
                self.name_of(culprit)
            )));
        }

        debug!(
            from = %self.name_of(from),
            to = %self.name_of(to),
            ?kind,
            "added edge"
        );
        Ok(())
    }

    fn ensure_known(&self, id: TaskId) -> Result<()> {
        if id.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(PipelineError::UnsatisfiedDependency(format!(
                "unknown task {id}"
            )))
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All task ids in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.nodes.len()).map(TaskId::new)
    }

    pub fn name_of(&self, id: TaskId) -> &str {
        self.nodes
            .get(id.index())
            .map(|n| n.spec.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.nodes
            .iter()
            .position(|n| n.spec.name == name)
            .map(TaskId::new)
    }

    pub fn spec(&self, id: TaskId) -> Option<&TaskSpec> {
        self.nodes.get(id.index()).map(|n| &n.spec)
    }

    /// Immediate predecessors with the kind of edge.
    pub fn parents_of(&self, id: TaskId) -> &[(TaskId, EdgeKind)] {
        self.nodes
            .get(id.index())
            .map(|n| n.parents.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate successors with the kind of edge.
    pub fn successors_of(&self, id: TaskId) -> &[(TaskId, EdgeKind)] {
        self.nodes
            .get(id.index())
            .map(|n| n.successors.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks with no incoming edge.
    pub fn roots(&self) -> Vec<TaskId> {
        self.tasks()
            .filter(|id| self.parents_of(*id).is_empty())
            .collect()
    }

    /// `id` plus everything reachable from its children (through any kind
    /// of edge). `id`'s own follow-ons are not part of its subtree.
    pub fn subtree_of(&self, id: TaskId) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        seen.insert(id);

        let mut stack: Vec<TaskId> = self
            .successors_of(id)
            .iter()
            .filter(|(_, kind)| *kind == EdgeKind::Child)
            .map(|(t, _)| *t)
            .collect();

        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.successors_of(next).iter().map(|(t, _)| *t));
            }
        }

        seen
    }

    /// Tasks that must have succeeded before `id` may become ready.
    ///
    /// A child edge gates on its source; a follow-on edge gates on the
    /// source's entire subtree.
    pub fn gates_of(&self, id: TaskId) -> BTreeSet<TaskId> {
        let mut gates = BTreeSet::new();
        for (parent, kind) in self.parents_of(id) {
            match kind {
                EdgeKind::Child => {
                    gates.insert(*parent);
                }
                EdgeKind::FollowOn => {
                    gates.extend(self.subtree_of(*parent));
                }
            }
        }
        gates
    }

    /// Every task that transitively gates `id`.
    pub fn ancestors_of(&self, id: TaskId) -> BTreeSet<TaskId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<TaskId> = self.gates_of(id).into_iter().collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.gates_of(next));
            }
        }
        seen
    }

    /// Build the "must finish before" relation as a petgraph graph.
    fn gate_graph(&self) -> DiGraphMap<TaskId, ()> {
        let mut graph: DiGraphMap<TaskId, ()> = DiGraphMap::new();
        for id in self.tasks() {
            graph.add_node(id);
        }
        for id in self.tasks() {
            for gate in self.gates_of(id) {
                graph.add_edge(gate, id, ());
            }
        }
        graph
    }

    /// A task involved in a waiting cycle, if any.
    fn find_gate_cycle(&self) -> Option<TaskId> {
        for id in self.tasks() {
            if self.gates_of(id).contains(&id) {
                return Some(id);
            }
        }
        let graph = self.gate_graph();
        if is_cyclic_directed(&graph) {
            // Any task that gates on one of its own dependents will do for
            // the message.
            return self
                .tasks()
                .find(|id| self.ancestors_of(*id).contains(id));
        }
        None
    }

    /// Check the invariants required before execution:
    /// at least one task, exactly one root, and every input binding reads
    /// from a task that is guaranteed to finish first.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(PipelineError::UnsatisfiedDependency(
                "graph contains no tasks".to_string(),
            ));
        }

        let roots = self.roots();
        if roots.len() != 1 {
            let names: Vec<&str> = roots.iter().map(|r| self.name_of(*r)).collect();
            return Err(PipelineError::UnsatisfiedDependency(format!(
                "graph must have exactly one root task, found {}: {:?}",
                roots.len(),
                names
            )));
        }

        if let Some(culprit) = self.find_gate_cycle() {
            return Err(PipelineError::Cycle(format!(
                "task '{}' waits on itself",
                self.name_of(culprit)
            )));
        }

        for id in self.tasks() {
            let ancestors = self.ancestors_of(id);
            let spec = &self.nodes[id.index()].spec;
            for (input, binding) in &spec.bindings {
                for producer in binding.producers() {
                    self.ensure_known(producer)?;
                    if !ancestors.contains(&producer) {
                        return Err(PipelineError::UnsatisfiedDependency(format!(
                            "input '{input}' of task '{}' reads from '{}', which is not guaranteed to finish first",
                            spec.name,
                            self.name_of(producer)
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Deterministic topological order over the gate relation.
    ///
    /// Among tasks whose gates are all placed, the lowest id goes first, so
    /// the order follows declaration order wherever dependencies allow.
    pub fn execution_order(&self) -> Result<Vec<TaskId>> {
        let gates: Vec<BTreeSet<TaskId>> = self.tasks().map(|id| self.gates_of(id)).collect();
        let mut remaining: Vec<usize> = gates.iter().map(|g| g.len()).collect();
        let mut gated_by: Vec<Vec<TaskId>> = vec![Vec::new(); self.nodes.len()];
        for id in self.tasks() {
            for gate in &gates[id.index()] {
                gated_by[gate.index()].push(id);
            }
        }

        let mut ready: BTreeSet<TaskId> = self
            .tasks()
            .filter(|id| remaining[id.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for dependent in &gated_by[next.index()] {
                remaining[dependent.index()] -= 1;
                if remaining[dependent.index()] == 0 {
                    ready.insert(*dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(PipelineError::Cycle(
                "task graph has no topological order".to_string(),
            ));
        }
        Ok(order)
    }
}

impl fmt::Display for DagGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.tasks() {
            write!(f, "{} {}", id, self.name_of(id))?;
            for (parent, kind) in self.parents_of(id) {
                let arrow = match kind {
                    EdgeKind::Child => "after",
                    EdgeKind::FollowOn => "follows",
                };
                write!(f, " [{arrow} {}]", self.name_of(*parent))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

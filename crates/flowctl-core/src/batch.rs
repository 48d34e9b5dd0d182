use std::collections::HashMap;

use crate::ast::{ExecUnit, Image};
use crate::ident::Identifier;

/// A single batch task. `local` distinguishes a task that runs on the
/// caller's machine from one dispatched to the remote cluster; the graph
/// core's locality check forbids a local task from depending, transitively,
/// on a remote one.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: Identifier,
    pub needs: Vec<Identifier>,
    pub exec: ExecUnit,
    pub local: bool,
}

/// A strategy-matrix task: one declared unit that expands, at graph-build
/// time, into one node per matrix cell. `cells` holds the pre-expanded
/// suffixes in declaration order (e.g. `["o1-t1", "o2-t1", "o2-t2",
/// "o3-t3"]`) — the source already enumerates the cells explicitly rather
/// than describing independent axes to cross, so no cartesian product is
/// computed here.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixTask {
    pub base_id: Identifier,
    pub cells: Vec<String>,
    pub needs: Vec<Identifier>,
    pub exec: ExecUnit,
    pub local: bool,
}

impl MatrixTask {
    /// The expanded node ids, e.g. `task-1-o1-t1`.
    pub fn expanded_ids(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|cell| format!("{}-{}", self.base_id, cell))
            .collect()
    }
}

/// Invokes a nested [`Action`] as a single node in the enclosing scope. The
/// nested action's own task graph is indexed under the path extended by
/// this call's id.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub id: Identifier,
    pub needs: Vec<Identifier>,
    pub action: Action,
}

/// A reusable subgraph of tasks. A `BatchFlow`'s root is itself an
/// `Action`; nested `ActionCall`s recurse into further `Action`s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Action {
    pub tasks: Vec<Task>,
    pub matrix_tasks: Vec<MatrixTask>,
    pub calls: Vec<ActionCall>,
    pub images: HashMap<Identifier, Image>,
}

/// The batch counterpart of an interactive [`crate::ast::Flow`]: an id plus
/// a root action.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFlow {
    pub id: Identifier,
    pub root: Action,
}

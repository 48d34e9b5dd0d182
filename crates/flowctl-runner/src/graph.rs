use std::collections::{HashMap, HashSet};

use flowctl_core::batch::{Action, BatchFlow};
use flowctl_core::expr::Expression;
use flowctl_core::ident::Identifier;
use flowctl_core::scope::Scope;

use crate::colored_topo;
use crate::error::{Result, RunnerError};

/// A path names a chain of nested action-invocation ids, root first.
pub type Path = Vec<String>;

/// `path → map<node, predecessors>`, exactly the nested structure in the
/// data model: each action invocation recurses into its own task graph,
/// indexed under the path extended by its id.
pub type Graph = HashMap<Path, HashMap<String, Vec<String>>>;

/// Walks the flow tree building the nested graph. Matrix tasks are
/// expanded into one node per declared cell, in declaration order.
pub fn build_graphs(flow: &BatchFlow) -> Graph {
    let mut graph = Graph::new();
    build_action_graph(&flow.root, Vec::new(), &mut graph);
    graph
}

/// A dependency may only name an `Identifier`, which cannot contain the
/// dashes a matrix task's expanded cell ids do — so a `needs` entry that
/// names a matrix task's base id is shorthand for depending on every one of
/// its expanded cells.
fn expand_needs(action: &Action, needs: &[Identifier]) -> Vec<String> {
    let mut out = Vec::new();
    for need in needs {
        if let Some(matrix) = action
            .matrix_tasks
            .iter()
            .find(|m| &m.base_id == need)
        {
            out.extend(matrix.expanded_ids());
        } else {
            out.push(need.to_string());
        }
    }
    out
}

fn build_action_graph(action: &Action, path: Path, graph: &mut Graph) {
    let mut node_preds: HashMap<String, Vec<String>> = HashMap::new();

    for task in &action.tasks {
        node_preds.insert(task.id.to_string(), expand_needs(action, &task.needs));
    }
    for matrix in &action.matrix_tasks {
        let needs = expand_needs(action, &matrix.needs);
        for expanded_id in matrix.expanded_ids() {
            node_preds.insert(expanded_id, needs.clone());
        }
    }
    for call in &action.calls {
        node_preds.insert(call.id.to_string(), expand_needs(action, &call.needs));
        let mut nested_path = path.clone();
        nested_path.push(call.id.to_string());
        build_action_graph(&call.action, nested_path, graph);
    }

    graph.insert(path, node_preds);
}

/// `build_graphs` is well-defined exactly when this succeeds: every scope
/// in the nested graph is acyclic.
pub fn check_no_cycles(flow: &BatchFlow) -> Result<()> {
    let graph = build_graphs(flow);
    for preds in graph.values() {
        colored_topo::check_no_cycles(preds)?;
    }
    Ok(())
}

/// A local action may not depend, transitively, on a remote task — whether
/// directly in its own scope, or by invoking a nested action that itself
/// contains one.
pub fn check_local_deps(flow: &BatchFlow) -> Result<()> {
    check_action_locality(&flow.root)
}

fn check_action_locality(action: &Action) -> Result<()> {
    let mut preds: HashMap<String, Vec<String>> = HashMap::new();
    let mut locality: HashMap<String, bool> = HashMap::new();

    for task in &action.tasks {
        preds.insert(task.id.to_string(), expand_needs(action, &task.needs));
        locality.insert(task.id.to_string(), task.local);
    }
    for matrix in &action.matrix_tasks {
        let needs = expand_needs(action, &matrix.needs);
        for expanded_id in matrix.expanded_ids() {
            preds.insert(expanded_id.clone(), needs.clone());
            locality.insert(expanded_id, matrix.local);
        }
    }
    for call in &action.calls {
        preds.insert(call.id.to_string(), expand_needs(action, &call.needs));
        locality.insert(call.id.to_string(), !action_is_remote_tainted(&call.action));
    }

    let mut node_ids: Vec<String> = locality.keys().cloned().collect();
    node_ids.sort();

    for id in node_ids {
        if !locality.get(&id).copied().unwrap_or(true) {
            continue;
        }
        let deps = colored_topo::transitive_deps(&id, &preds);
        let mut dep_ids: Vec<String> = deps.into_iter().collect();
        dep_ids.sort();
        for dep in dep_ids {
            if locality.get(&dep).copied().unwrap_or(true) {
                continue;
            }
            if let Some(call) = action.calls.iter().find(|c| c.id.to_string() == dep) {
                let remote_name =
                    find_first_remote_task(&call.action).unwrap_or_else(|| dep.clone());
                return Err(RunnerError::LocalDepError(format!(
                    "Local action '{id}' depends on remote task '{}.{remote_name}'",
                    call.id
                )));
            }
            return Err(RunnerError::LocalDepError(format!(
                "Local action '{id}' depends on remote task '{dep}'"
            )));
        }
    }

    for call in &action.calls {
        check_action_locality(&call.action)?;
    }
    Ok(())
}

fn action_is_remote_tainted(action: &Action) -> bool {
    action.tasks.iter().any(|t| !t.local)
        || action.matrix_tasks.iter().any(|mt| !mt.local)
        || action.calls.iter().any(|c| action_is_remote_tainted(&c.action))
}

fn find_first_remote_task(action: &Action) -> Option<String> {
    for task in &action.tasks {
        if !task.local {
            return Some(task.id.to_string());
        }
    }
    for matrix in &action.matrix_tasks {
        if !matrix.local {
            if let Some(id) = matrix.expanded_ids().into_iter().next() {
                return Some(id);
            }
        }
    }
    for call in &action.calls {
        if let Some(name) = find_first_remote_task(&call.action) {
            return Some(format!("{}.{name}", call.id));
        }
    }
    None
}

/// Fails when two image entries — including those contributed by nested
/// actions — bind the same ref URI.
pub fn check_image_refs_unique(flow: &BatchFlow) -> Result<()> {
    let scope = Scope::root();
    let mut refs = Vec::new();
    collect_image_refs(&flow.root, &scope, &mut refs)?;

    let mut seen = HashSet::new();
    for r in refs {
        if !seen.insert(r.clone()) {
            return Err(RunnerError::DuplicateImageRef(r));
        }
    }
    Ok(())
}

fn collect_image_refs(action: &Action, scope: &Scope, out: &mut Vec<String>) -> Result<()> {
    for image in action.images.values() {
        let uri = match &image.reference {
            Expression::Literal(uri) => uri.clone(),
            Expression::Template(_) => image.reference.eval(scope)?,
        };
        out.push(uri.as_str().to_string());
    }
    for call in &action.calls {
        collect_image_refs(&call.action, scope, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowctl_core::ast::ExecUnit;
    use flowctl_core::batch::{ActionCall, MatrixTask, Task};
    use flowctl_core::expr::Opt;
    use flowctl_core::types::Uri;
    use std::collections::HashMap as Map;

    fn unit(id: &str) -> ExecUnit {
        ExecUnit {
            id: Identifier::new(id).unwrap(),
            title: Opt::absent(),
            name: Opt::absent(),
            image: Expression::Literal(Uri::parse("image:demo").unwrap()),
            preset: Opt::absent(),
            entrypoint: Opt::absent(),
            cmd: Expression::Literal("echo hi".to_string()),
            workdir: Opt::absent(),
            env: Map::new(),
            volumes: Vec::new(),
            tags: Vec::new(),
            life_span: Opt::absent(),
            http_port: Opt::absent(),
            http_auth: Opt::absent(),
            schedule_timeout: Opt::absent(),
            port_forward: Vec::new(),
            pass_config: false,
        }
    }

    fn needs(ids: &[&str]) -> Vec<Identifier> {
        ids.iter().map(|s| Identifier::new(*s).unwrap()).collect()
    }

    /// The `early_graph` fixture from scenario 3: `first_ac`, then `second`
    /// and `third` each depending on it and invoking the same nested action
    /// (a matrix task expanding to 4 cells plus a `task_2` depending on all
    /// of them).
    fn early_graph() -> BatchFlow {
        let nested = Action {
            tasks: vec![Task {
                id: Identifier::new("task_2").unwrap(),
                needs: needs(&["task_1"]),
                exec: unit("task_2"),
                local: false,
            }],
            matrix_tasks: vec![MatrixTask {
                base_id: Identifier::new("task_1").unwrap(),
                cells: vec![
                    "o1-t1".to_string(),
                    "o2-t1".to_string(),
                    "o2-t2".to_string(),
                    "o3-t3".to_string(),
                ],
                needs: Vec::new(),
                exec: unit("task_1"),
                local: false,
            }],
            calls: Vec::new(),
            images: Map::new(),
        };

        let root = Action {
            tasks: vec![Task {
                id: Identifier::new("first_ac").unwrap(),
                needs: Vec::new(),
                exec: unit("first_ac"),
                local: false,
            }],
            matrix_tasks: Vec::new(),
            calls: vec![
                ActionCall {
                    id: Identifier::new("second").unwrap(),
                    needs: needs(&["first_ac"]),
                    action: nested.clone(),
                },
                ActionCall {
                    id: Identifier::new("third").unwrap(),
                    needs: needs(&["first_ac"]),
                    action: nested,
                },
            ],
            images: Map::new(),
        };

        BatchFlow {
            id: Identifier::new("early_graph").unwrap(),
            root,
        }
    }

    #[test]
    fn matrix_expansion_matches_fixture() {
        let graph = build_graphs(&early_graph());

        let root = graph.get(&Vec::<String>::new()).unwrap();
        assert_eq!(root.get("first_ac").unwrap(), &Vec::<String>::new());
        assert_eq!(root.get("second").unwrap(), &vec!["first_ac".to_string()]);
        assert_eq!(root.get("third").unwrap(), &vec!["first_ac".to_string()]);

        for branch in ["second", "third"] {
            let nested = graph.get(&vec![branch.to_string()]).unwrap();
            assert!(nested.contains_key("task_1-o1-t1"));
            assert!(nested.contains_key("task_1-o2-t1"));
            assert!(nested.contains_key("task_1-o2-t2"));
            assert!(nested.contains_key("task_1-o3-t3"));
            let mut task2_needs = nested.get("task_2").unwrap().clone();
            task2_needs.sort();
            let mut expected = vec![
                "task_1-o1-t1".to_string(),
                "task_1-o2-t1".to_string(),
                "task_1-o2-t2".to_string(),
                "task_1-o3-t3".to_string(),
            ];
            expected.sort();
            assert_eq!(task2_needs, expected);
        }
    }

    #[test]
    fn check_no_cycles_passes_for_fixture() {
        assert!(check_no_cycles(&early_graph()).is_ok());
    }

    #[test]
    fn check_no_cycles_detects_cycle() {
        let root = Action {
            tasks: vec![
                Task {
                    id: Identifier::new("a").unwrap(),
                    needs: needs(&["b"]),
                    exec: unit("a"),
                    local: false,
                },
                Task {
                    id: Identifier::new("b").unwrap(),
                    needs: needs(&["a"]),
                    exec: unit("b"),
                    local: false,
                },
            ],
            matrix_tasks: Vec::new(),
            calls: Vec::new(),
            images: Map::new(),
        };
        let flow = BatchFlow {
            id: Identifier::new("batch_cycle").unwrap(),
            root,
        };
        assert!(check_no_cycles(&flow).is_err());
    }

    #[test]
    fn check_local_deps_flags_local_on_remote() {
        let root = Action {
            tasks: vec![
                Task {
                    id: Identifier::new("local").unwrap(),
                    needs: needs(&["remote"]),
                    exec: unit("local"),
                    local: true,
                },
                Task {
                    id: Identifier::new("remote").unwrap(),
                    needs: Vec::new(),
                    exec: unit("remote"),
                    local: false,
                },
            ],
            matrix_tasks: Vec::new(),
            calls: Vec::new(),
            images: Map::new(),
        };
        let flow = BatchFlow {
            id: Identifier::new("locality").unwrap(),
            root,
        };
        let err = check_local_deps(&flow).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Local action 'local' depends on remote task 'remote'"
        );
    }

    #[test]
    fn check_image_refs_unique_detects_duplicate() {
        let mut images = Map::new();
        let image_a = flowctl_core::ast::Image {
            id: Identifier::new("a").unwrap(),
            reference: Expression::Literal(Uri::parse("image:banana1").unwrap()),
            context: Opt::absent(),
            dockerfile: Opt::absent(),
            build_args: Map::new(),
            env: Map::new(),
            build_preset: Opt::absent(),
            force_rebuild: Expression::Literal(false),
        };
        let mut image_b = image_a.clone();
        image_b.id = Identifier::new("b").unwrap();
        images.insert(image_a.id.clone(), image_a);
        images.insert(image_b.id.clone(), image_b);

        let flow = BatchFlow {
            id: Identifier::new("dup_images").unwrap(),
            root: Action {
                tasks: Vec::new(),
                matrix_tasks: Vec::new(),
                calls: Vec::new(),
                images,
            },
        };

        let err = check_image_refs_unique(&flow).unwrap_err();
        assert_eq!(err.to_string(), "Image ref 'image:banana1' is duplicated");
    }
}

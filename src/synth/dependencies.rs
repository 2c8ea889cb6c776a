//! synth::dependencies
//!
//! Node dependencies turned into template `DependsOn` entries and unit
//! ordering.
//!
//! A dependency between two nodes expands to every element below each of
//! them: resources, and nested stacks taken as a whole. For each pair the
//! chains of units enclosing the two elements are compared. Where they
//! diverge inside a shared unit, the two entries of that unit's template
//! that contain the elements get a `DependsOn` edge. Where they share no
//! unit, the outermost unit of the source deploys after the outermost unit
//! of the target.

use std::collections::BTreeSet;

use tracing::debug;

use crate::construct::{NodeIdx, NodeKind, StructuralError, Tree};
use crate::core::graph::DependencyGraph;

/// Fail with `DependencyCycle` if node dependencies form a cycle.
pub fn check_node_cycles(tree: &Tree) -> Result<(), StructuralError> {
    let mut graph = DependencyGraph::new();
    for idx in all_nodes(tree) {
        for target in tree.dependencies(idx) {
            graph.add_edge(idx, *target);
        }
    }
    match graph.find_cycle() {
        Some(cycle) => Err(cycle_error(tree, &cycle)),
        None => Ok(()),
    }
}

/// Fail with `DependencyCycle` if deployment units wait on each other.
pub fn check_unit_cycles(tree: &Tree) -> Result<(), StructuralError> {
    let mut graph = DependencyGraph::new();
    for unit in tree.units() {
        graph.add_node(unit);
        if let Some(data) = tree.stack(unit) {
            for target in &data.derived.unit_dependencies {
                graph.add_edge(unit, *target);
            }
        }
    }
    match graph.find_cycle() {
        Some(cycle) => Err(cycle_error(tree, &cycle)),
        None => Ok(()),
    }
}

/// Record `DependsOn` edges and unit dependencies for every node dependency.
pub fn propagate(tree: &mut Tree) -> Result<(), StructuralError> {
    let mut edges = 0usize;
    for source in all_nodes(tree) {
        let targets = tree.dependencies(source).to_vec();
        for target in targets {
            for s in elements(tree, source) {
                for t in elements(tree, target) {
                    if record(tree, s, t)? {
                        edges += 1;
                    }
                }
            }
        }
    }
    debug!(edges, "node dependencies propagated");
    Ok(())
}

fn all_nodes(tree: &Tree) -> Vec<NodeIdx> {
    tree.find_all(tree.root(), crate::construct::TraversalOrder::PreOrder)
}

/// Deployable elements below `idx`; a stack stands for its whole subtree.
fn elements(tree: &Tree, idx: NodeIdx) -> Vec<NodeIdx> {
    let mut out = Vec::new();
    let mut pending = vec![idx];
    while let Some(n) = pending.pop() {
        match tree.kind(n) {
            NodeKind::Stack(_) | NodeKind::Resource(_) => out.push(n),
            NodeKind::Root | NodeKind::Construct => {
                pending.extend(tree.children(n).iter().rev().copied());
            }
            NodeKind::Fragment(_) => {}
        }
    }
    out
}

/// Units enclosing an element, outermost first, ending with the element.
fn element_path(tree: &Tree, element: NodeIdx) -> Vec<NodeIdx> {
    if tree.stack(element).is_some() {
        return tree.unit_chain(element);
    }
    let mut path = tree
        .unit_of(element)
        .map(|u| tree.unit_chain(u))
        .unwrap_or_default();
    path.push(element);
    path
}

fn record(tree: &mut Tree, source: NodeIdx, target: NodeIdx) -> Result<bool, StructuralError> {
    if source == target {
        return Ok(false);
    }
    let s = element_path(tree, source);
    let t = element_path(tree, target);
    let common = s.iter().zip(&t).take_while(|(a, b)| a == b).count();

    // One element contains the other.
    if common >= s.len() || common >= t.len() {
        return Ok(false);
    }

    if common == 0 {
        // Resources outside any unit have nothing to order.
        if tree.stack(s[0]).is_none() || tree.stack(t[0]).is_none() {
            return Ok(false);
        }
        let path = tree.path(s[0]);
        let data = tree.stack_mut(s[0]).ok_or(StructuralError::WrongKind {
            path,
            expected: "stack",
        })?;
        return Ok(data.derived.unit_dependencies.insert(t[0]));
    }

    let container = s[common - 1];
    let path = tree.path(container);
    let data = tree.stack_mut(container).ok_or(StructuralError::WrongKind {
        path,
        expected: "stack",
    })?;
    Ok(data
        .derived
        .depends_on
        .entry(s[common])
        .or_insert_with(BTreeSet::new)
        .insert(t[common]))
}

fn cycle_error(tree: &Tree, cycle: &[NodeIdx]) -> StructuralError {
    StructuralError::DependencyCycle {
        paths: cycle.iter().map(|n| tree.path(*n)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Resource, Stack, StackProps};
    use serde_json::json;

    fn depends_on(tree: &Tree, unit: Stack, element: NodeIdx) -> Vec<NodeIdx> {
        unit.data(tree)
            .derived()
            .depends_on
            .get(&element)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    #[test]
    fn same_unit_dependency_becomes_depends_on() {
        let mut tree = Tree::new();
        let root = tree.root();
        let app = Stack::new(&mut tree, root, "App", StackProps::default()).unwrap();
        let a = Resource::new(&mut tree, app.node(), "A", "T::A", json!({})).unwrap();
        let b = Resource::new(&mut tree, app.node(), "B", "T::B", json!({})).unwrap();
        a.add_depends_on(&mut tree, b).unwrap();

        propagate(&mut tree).unwrap();
        assert_eq!(depends_on(&tree, app, a.node()), vec![b.node()]);
        assert!(app.data(&tree).derived().unit_dependencies.is_empty());
    }

    #[test]
    fn construct_dependency_expands_to_resources() {
        let mut tree = Tree::new();
        let root = tree.root();
        let app = Stack::new(&mut tree, root, "App", StackProps::default()).unwrap();
        let group = tree.add_child(app.node(), "Group").unwrap();
        let x = Resource::new(&mut tree, group, "X", "T::X", json!({})).unwrap();
        let y = Resource::new(&mut tree, group, "Y", "T::Y", json!({})).unwrap();
        let db = Resource::new(&mut tree, app.node(), "Db", "T::Db", json!({})).unwrap();
        tree.add_dependency(group, db.node()).unwrap();

        propagate(&mut tree).unwrap();
        assert_eq!(depends_on(&tree, app, x.node()), vec![db.node()]);
        assert_eq!(depends_on(&tree, app, y.node()), vec![db.node()]);
    }

    #[test]
    fn cross_stack_dependency_orders_units() {
        let mut tree = Tree::new();
        let root = tree.root();
        let web = Stack::new(&mut tree, root, "Web", StackProps::default()).unwrap();
        let db = Stack::new(&mut tree, root, "Db", StackProps::default()).unwrap();
        web.add_dependency(&mut tree, db).unwrap();

        propagate(&mut tree).unwrap();
        let deps = &web.data(&tree).derived().unit_dependencies;
        assert_eq!(deps.iter().copied().collect::<Vec<_>>(), vec![db.node()]);
    }

    #[test]
    fn nested_resource_dependency_lands_on_nested_stack_entry() {
        let mut tree = Tree::new();
        let root = tree.root();
        let parent = Stack::new(&mut tree, root, "Parent", StackProps::default()).unwrap();
        let nested = Stack::new(&mut tree, parent.node(), "Inner", StackProps::default()).unwrap();
        let inner = Resource::new(&mut tree, nested.node(), "Queue", "T::Q", json!({})).unwrap();
        let outer = Resource::new(&mut tree, parent.node(), "Topic", "T::T", json!({})).unwrap();
        inner.add_depends_on(&mut tree, outer).unwrap();

        propagate(&mut tree).unwrap();
        assert_eq!(depends_on(&tree, parent, nested.node()), vec![outer.node()]);
        assert!(depends_on(&tree, nested, inner.node()).is_empty());
    }

    #[test]
    fn node_cycle_is_reported_with_paths() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.add_child(root, "A").unwrap();
        let b = tree.add_child(root, "B").unwrap();
        tree.add_dependency(a, b).unwrap();
        tree.add_dependency(b, a).unwrap();

        let err = check_node_cycles(&tree).unwrap_err();
        assert!(matches!(err, StructuralError::DependencyCycle { ref paths } if paths == &["A", "B"]));
    }
}

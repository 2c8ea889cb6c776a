//! construct::aspect
//!
//! Visitors and lifecycle hooks attached to nodes.
//!
//! # Aspect invocation
//!
//! Each pass walks the tree in pre-order. A node receives every aspect
//! registered on it or on an ancestor, each at most once over the whole
//! run. Children are read after their parent's visits, so nodes created by
//! an aspect are visited in the same pass. A pass that registers no new
//! aspect ends the loop; otherwise another pass runs, up to the bound.

use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use super::tree::{NodeIdx, StructuralError, Tree};

/// Default bound on aspect passes.
pub const DEFAULT_MAX_ASPECT_PASSES: usize = 1000;

/// A visitor applied to every node in a subtree before preparation.
pub trait Aspect {
    fn visit(&self, tree: &mut Tree, node: NodeIdx) -> Result<(), StructuralError>;
}

impl<F> Aspect for F
where
    F: Fn(&mut Tree, NodeIdx) -> Result<(), StructuralError>,
{
    fn visit(&self, tree: &mut Tree, node: NodeIdx) -> Result<(), StructuralError> {
        self(tree, node)
    }
}

/// Optional prepare and validate hooks of a node.
pub trait ConstructHooks {
    /// Last chance to mutate the node before templates are rendered.
    fn prepare(&self, _tree: &mut Tree, _node: NodeIdx) -> Result<(), StructuralError> {
        Ok(())
    }

    /// Validation failures for this node.
    fn validate(&self, _tree: &Tree, _node: NodeIdx) -> Vec<String> {
        Vec::new()
    }
}

/// Errors from the aspect loop.
#[derive(Debug, Error)]
pub enum AspectError {
    #[error("aspects did not converge after {passes} passes")]
    Convergence { passes: usize },

    #[error(transparent)]
    Visit(#[from] StructuralError),
}

/// Invoke every applied aspect until no new aspect appears.
///
/// Returns the number of passes that ran.
pub fn invoke_aspects(tree: &mut Tree, max_passes: usize) -> Result<usize, AspectError> {
    for pass in 1..=max_passes {
        let before = tree.aspect_count();
        let root = tree.root();
        visit(tree, root, &[])?;
        let after = tree.aspect_count();
        debug!(pass, aspects = after, "aspect pass complete");
        if after == before {
            return Ok(pass);
        }
    }
    Err(AspectError::Convergence { passes: max_passes })
}

fn visit(tree: &mut Tree, idx: NodeIdx, inherited: &[Rc<dyn Aspect>]) -> Result<(), StructuralError> {
    let mut applicable: Vec<Rc<dyn Aspect>> = inherited.to_vec();
    applicable.extend(tree.node(idx).aspects.iter().cloned());

    for aspect in &applicable {
        let key = aspect_key(aspect);
        if tree.node(idx).invoked_aspects.contains(&key) {
            continue;
        }
        tree.node_mut(idx).invoked_aspects.push(key);
        aspect.visit(tree, idx)?;
    }

    // Aspects added to this node while visiting it still reach its children.
    let mut for_children: Vec<Rc<dyn Aspect>> = inherited.to_vec();
    for_children.extend(tree.node(idx).aspects.iter().cloned());

    let mut i = 0;
    while let Some(child) = tree.node(idx).children().get(i).copied() {
        visit(tree, child, &for_children)?;
        i += 1;
    }
    Ok(())
}

fn aspect_key(aspect: &Rc<dyn Aspect>) -> usize {
    Rc::as_ptr(aspect) as *const () as usize
}

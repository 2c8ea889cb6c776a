//! reference
//!
//! Tokens pointing at an attribute of a node, and the wiring that carries
//! them across deployment units.
//!
//! # Modules
//!
//! - [`materialize`] - Export/import and output/parameter synthesis
//!
//! # Lifecycle
//!
//! 1. A client asks a resource for an attribute and embeds the returned
//!    token anywhere in the tree
//! 2. While templates are rendered in the preparing phase, each reference
//!    records the consuming scope and yields its local intrinsic
//! 3. [`materialize::materialize`] wires every recorded cross-unit use and
//!    stores, per consuming unit, the value the reference yields there
//! 4. In the final phase the reference yields the local intrinsic inside
//!    its own unit and the stored replacement elsewhere

pub mod materialize;

pub use materialize::materialize;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use thiserror::Error;

use crate::construct::NodeIdx;
use crate::token::{ResolveContext, ResolveError, ResolvePhase, TokenId, ValueDomain};

/// Errors from reference resolution and materialization.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error(
        "'{consumer}' ({consumer_env}) references '{producer}' ({producer_env}) in another environment; pass the value explicitly"
    )]
    CrossEnvironment {
        producer: String,
        consumer: String,
        producer_env: String,
        consumer_env: String,
    },

    #[error("reference to node {0} which is not part of this tree")]
    ForeignNode(NodeIdx),

    #[error("'{path}' is referenced but is not inside a stack")]
    NoEnclosingUnit { path: String },

    #[error("reference to '{target}' from '{consumer}' was never materialized")]
    NotMaterialized { target: String, consumer: String },

    #[error("cannot materialize reference to '{target}': {message}")]
    Materialization { target: String, message: String },
}

/// Which attribute of the target a reference yields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefAttribute {
    /// The element's primary identifier.
    Ref,
    /// A named attribute.
    GetAtt(String),
}

impl RefAttribute {
    /// Token hint and name component for derived outputs.
    pub fn hint(&self) -> String {
        match self {
            RefAttribute::Ref => "Ref".to_string(),
            RefAttribute::GetAtt(name) => name.clone(),
        }
    }

    /// The intrinsic reading this attribute of `logical_id` in its own unit.
    pub fn intrinsic(&self, logical_id: &str) -> Value {
        match self {
            RefAttribute::Ref => json!({ "Ref": logical_id }),
            RefAttribute::GetAtt(name) => json!({ "Fn::GetAtt": [logical_id, name] }),
        }
    }
}

/// A reference to an attribute of a node.
#[derive(Debug)]
pub struct Reference {
    target: NodeIdx,
    attribute: RefAttribute,
    domain: ValueDomain,
    replacements: RefCell<BTreeMap<NodeIdx, Value>>,
}

impl Reference {
    pub(crate) fn new(target: NodeIdx, attribute: RefAttribute, domain: ValueDomain) -> Self {
        Self {
            target,
            attribute,
            domain,
            replacements: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn target(&self) -> NodeIdx {
        self.target
    }

    pub fn attribute(&self) -> &RefAttribute {
        &self.attribute
    }

    pub fn domain(&self) -> ValueDomain {
        self.domain
    }

    /// Value yielded in `consumer_unit` after materialization.
    pub fn replacement(&self, consumer_unit: NodeIdx) -> Option<Value> {
        self.replacements.borrow().get(&consumer_unit).cloned()
    }

    pub(crate) fn set_replacement(&self, consumer_unit: NodeIdx, value: Value) {
        self.replacements.borrow_mut().insert(consumer_unit, value);
    }

    pub(crate) fn clear_replacements(&self) {
        self.replacements.borrow_mut().clear();
    }

    /// Produce this reference's value for the context's scope.
    pub(crate) fn produce(&self, ctx: &ResolveContext<'_>, token: TokenId) -> Result<Value, ResolveError> {
        let tree = ctx.tree;
        if !tree.contains(self.target) {
            return Err(ReferenceError::ForeignNode(self.target).into());
        }

        let producer_unit = tree.unit_of(self.target);
        let logical_id = tree.logical_id(self.target);
        let (Some(producer_unit), Some(logical_id)) = (producer_unit, logical_id) else {
            return Err(ReferenceError::NoEnclosingUnit {
                path: tree.path(self.target),
            }
            .into());
        };
        let local = self.attribute.intrinsic(&logical_id);

        match ctx.phase {
            ResolvePhase::Preparing => {
                ctx.record_reference(token);
                Ok(local)
            }
            ResolvePhase::Final => match tree.unit_of(ctx.scope) {
                Some(consumer) if consumer != producer_unit => {
                    self.replacement(consumer).ok_or_else(|| {
                        ReferenceError::NotMaterialized {
                            target: tree.path(self.target),
                            consumer: tree.path(ctx.scope),
                        }
                        .into()
                    })
                }
                _ => Ok(local),
            },
        }
    }
}

/// Collects `(consumer scope, reference token)` pairs during preparation.
#[derive(Debug, Default)]
pub struct ReferenceRecorder {
    uses: RefCell<BTreeSet<(NodeIdx, TokenId)>>,
}

impl ReferenceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, scope: NodeIdx, token: TokenId) {
        self.uses.borrow_mut().insert((scope, token));
    }

    pub fn len(&self) -> usize {
        self.uses.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.borrow().is_empty()
    }

    /// Recorded uses, sorted by scope then token.
    pub fn into_uses(self) -> BTreeSet<(NodeIdx, TokenId)> {
        self.uses.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::Tree;
    use crate::stack::{Resource, Stack, StackProps};
    use crate::token::resolve;

    fn two_stacks() -> (Tree, Stack, Stack, Resource) {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = Stack::new(&mut tree, root, "A", StackProps::default()).unwrap();
        let b = Stack::new(&mut tree, root, "B", StackProps::default()).unwrap();
        let x = Resource::new(&mut tree, a.node(), "X", "T::X", json!({})).unwrap();
        (tree, a, b, x)
    }

    #[test]
    fn intrinsics() {
        assert_eq!(RefAttribute::Ref.intrinsic("X"), json!({"Ref": "X"}));
        assert_eq!(
            RefAttribute::GetAtt("Arn".into()).intrinsic("X"),
            json!({"Fn::GetAtt": ["X", "Arn"]})
        );
    }

    #[test]
    fn same_unit_yields_local_intrinsic() {
        let (tree, a, _, x) = two_stacks();
        let arn = x.get_att(&tree, "Arn");
        let ctx = ResolveContext::new(&tree, a.node());
        assert_eq!(
            resolve(&json!(arn), &ctx).unwrap(),
            json!({"Fn::GetAtt": ["X", "Arn"]})
        );
    }

    #[test]
    fn preparing_records_and_returns_placeholder() {
        let (tree, _, b, x) = two_stacks();
        let arn = x.get_att(&tree, "Arn");
        let recorder = ReferenceRecorder::new();
        let ctx = ResolveContext::new(&tree, b.node()).preparing(&recorder);

        let out = resolve(&json!({"Value": arn}), &ctx).unwrap();
        assert_eq!(out, json!({"Value": {"Fn::GetAtt": ["X", "Arn"]}}));
        assert_eq!(recorder.len(), 1);
        let (scope, _) = recorder.into_uses().into_iter().next().unwrap();
        assert_eq!(scope, b.node());
    }

    #[test]
    fn unmaterialized_cross_unit_use_fails() {
        let (tree, _, b, x) = two_stacks();
        let arn = x.get_att(&tree, "Arn");
        let ctx = ResolveContext::new(&tree, b.node());
        assert!(matches!(
            resolve(&json!(arn), &ctx),
            Err(ResolveError::Reference(ReferenceError::NotMaterialized { .. }))
        ));
    }
}

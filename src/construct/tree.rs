//! construct::tree
//!
//! The arena holding every node of a construct tree.
//!
//! # Architecture
//!
//! Nodes live in one `Vec` owned by [`Tree`]; [`NodeIdx`] is an index into
//! it. Parents own an ordered list of child indices, children keep their
//! parent index. Nothing is ever removed, so an index stays valid for the
//! lifetime of the tree. Passing an index from another tree is a
//! programming error and panics.
//!
//! # Invariants
//!
//! - Sibling ids are unique
//! - Ids are immutable once created
//! - A locked node accepts no children and no context changes
//! - Context can only be set on a node without children

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use super::aspect::{Aspect, ConstructHooks};
use super::metadata::{self, caller_trace, DISABLE_STACK_TRACE};
use crate::assembly::schema::{MetadataEntry, MissingContext};
use crate::core::naming::make_unique_id;
use crate::core::types::{ConstructId, TypeError, PATH_SEP};
use crate::stack::{ResourceData, StackData, TemplateFragment};
use crate::token::TokenRegistry;

/// Errors from structural operations on the tree.
#[derive(Debug, Error)]
pub enum StructuralError {
    #[error("there is already a construct with id '{id}' under '{}'", display_path(.parent))]
    DuplicateId { parent: String, id: String },

    #[error(transparent)]
    Invalid(#[from] TypeError),

    #[error("cannot add to '{}': the tree is locked for synthesis", display_path(.path))]
    Locked { path: String },

    #[error("cannot set context '{key}' on '{}': it already has children", display_path(.path))]
    ContextAfterChildren { path: String, key: String },

    #[error("'{}' cannot depend on itself", display_path(.path))]
    SelfDependency { path: String },

    #[error("dependency cycle: {}", .paths.join(" -> "))]
    DependencyCycle { paths: Vec<String> },

    #[error("no child with id '{id}' under '{}'", display_path(.path))]
    NoSuchChild { path: String, id: String },

    #[error("'{}' is not a {expected}", display_path(.path))]
    WrongKind { path: String, expected: &'static str },

    #[error("duplicate logical id '{logical_id}' in stack '{}'", display_path(.stack))]
    DuplicateLogicalId { stack: String, logical_id: String },

    #[error("{what} '{name}' already exists in stack '{}'", display_path(.stack))]
    DuplicateElement {
        stack: String,
        what: &'static str,
        name: String,
    },

    #[error("nested stack '{}' must share its parent's environment", display_path(.path))]
    EnvironmentMismatch { path: String },

    #[error("cannot read asset '{path}': {source}")]
    AssetSource {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

/// Index of a node within its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub(crate) usize);

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Depth-first traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Parents before children.
    PreOrder,
    /// Children before parents.
    PostOrder,
}

/// What a node is, beyond its position in the tree.
pub enum NodeKind {
    Root,
    Construct,
    Stack(Box<StackData>),
    Resource(Box<ResourceData>),
    Fragment(Rc<dyn TemplateFragment>),
}

impl NodeKind {
    /// Short name for messages.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Construct => "construct",
            NodeKind::Stack(_) => "stack",
            NodeKind::Resource(_) => "resource",
            NodeKind::Fragment(_) => "fragment",
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Stack(data) => f.debug_tuple("Stack").field(data).finish(),
            NodeKind::Resource(data) => f.debug_tuple("Resource").field(data).finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// One position in the construct tree.
pub struct Node {
    id: ConstructId,
    parent: Option<NodeIdx>,
    children: Vec<NodeIdx>,
    metadata: Vec<MetadataEntry>,
    dependencies: Vec<NodeIdx>,
    context: BTreeMap<String, Value>,
    locked: bool,
    pub(crate) aspects: Vec<Rc<dyn Aspect>>,
    pub(crate) hooks: Vec<Rc<dyn ConstructHooks>>,
    pub(crate) invoked_aspects: Vec<usize>,
    kind: NodeKind,
}

impl Node {
    fn new(id: ConstructId, parent: Option<NodeIdx>, kind: NodeKind) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            metadata: Vec::new(),
            dependencies: Vec::new(),
            context: BTreeMap::new(),
            locked: false,
            aspects: Vec::new(),
            hooks: Vec::new(),
            invoked_aspects: Vec::new(),
            kind,
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    pub fn parent(&self) -> Option<NodeIdx> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeIdx] {
        &self.children
    }

    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    pub fn dependencies(&self) -> &[NodeIdx] {
        &self.dependencies
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// The construct tree.
///
/// # Example
///
/// ```
/// use cxsynth::construct::{Tree, TraversalOrder};
///
/// let mut tree = Tree::new();
/// let web = tree.add_child(tree.root(), "Web").unwrap();
/// let api = tree.add_child(web, "Api").unwrap();
///
/// assert_eq!(tree.path(api), "Web/Api");
/// assert_eq!(tree.find_child(web, "Api").unwrap(), api);
/// assert!(tree.add_child(web, "Api").is_err());
///
/// let order = tree.find_all(tree.root(), TraversalOrder::PostOrder);
/// assert_eq!(order, vec![api, web, tree.root()]);
/// ```
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    tokens: TokenRegistry,
    missing: BTreeMap<String, MissingContext>,
    aspect_window: bool,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only its root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(ConstructId::root(), None, NodeKind::Root)],
            tokens: TokenRegistry::new(),
            missing: BTreeMap::new(),
            aspect_window: false,
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeIdx {
        NodeIdx(0)
    }

    /// The token registry of this tree.
    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root exists from creation.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    /// Whether the index belongs to this tree.
    pub fn contains(&self, idx: NodeIdx) -> bool {
        idx.0 < self.nodes.len()
    }

    /// Add a plain child construct.
    ///
    /// # Errors
    ///
    /// - `Invalid` if the id is empty or embeds a token
    /// - `DuplicateId` if a sibling already has the id
    /// - `Locked` if the parent is locked for synthesis
    pub fn add_child(&mut self, parent: NodeIdx, id: &str) -> Result<NodeIdx, StructuralError> {
        self.add_node(parent, id, NodeKind::Construct)
    }

    pub(crate) fn add_node(
        &mut self,
        parent: NodeIdx,
        id: &str,
        kind: NodeKind,
    ) -> Result<NodeIdx, StructuralError> {
        let id = ConstructId::new(id)?;

        if self.node(parent).locked && !self.aspect_window {
            return Err(StructuralError::Locked {
                path: self.path(parent),
            });
        }

        if self.try_find_child(parent, id.as_str()).is_some() {
            return Err(StructuralError::DuplicateId {
                parent: self.path(parent),
                id: id.to_string(),
            });
        }

        let idx = NodeIdx(self.nodes.len());
        self.nodes.push(Node::new(id, Some(parent), kind));
        self.node_mut(parent).children.push(idx);
        Ok(idx)
    }

    /// Find a direct child by id.
    pub fn try_find_child(&self, parent: NodeIdx, id: &str) -> Option<NodeIdx> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.node(*c).id() == id)
    }

    /// Find a direct child by id, failing if absent.
    pub fn find_child(&self, parent: NodeIdx, id: &str) -> Result<NodeIdx, StructuralError> {
        self.try_find_child(parent, id)
            .ok_or_else(|| StructuralError::NoSuchChild {
                path: self.path(parent),
                id: id.to_string(),
            })
    }

    pub fn parent(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.node(idx).parent
    }

    pub fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.node(idx).children
    }

    pub fn id(&self, idx: NodeIdx) -> &str {
        self.node(idx).id()
    }

    pub fn kind(&self, idx: NodeIdx) -> &NodeKind {
        &self.node(idx).kind
    }

    /// Ancestors from the root down to and including `idx`.
    pub fn scopes(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut chain = vec![idx];
        let mut current = self.node(idx).parent;
        while let Some(p) = current {
            chain.push(p);
            current = self.node(p).parent;
        }
        chain.reverse();
        chain
    }

    /// Ids from below the root down to `idx`.
    pub fn path_components(&self, idx: NodeIdx) -> Vec<&str> {
        self.scopes(idx)
            .into_iter()
            .skip(1)
            .map(|n| self.node(n).id())
            .collect()
    }

    /// Slash-joined path from the root. The root's path is empty.
    pub fn path(&self, idx: NodeIdx) -> String {
        self.path_components(idx).join(PATH_SEP)
    }

    /// Stable, alphanumeric, hash-suffixed id derived from the path.
    pub fn unique_id(&self, idx: NodeIdx) -> String {
        make_unique_id(&self.path_components(idx))
    }

    /// Every node of the subtree at `from`, depth-first.
    pub fn find_all(&self, from: NodeIdx, order: TraversalOrder) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        match order {
            TraversalOrder::PreOrder => {
                let mut stack = vec![from];
                while let Some(idx) = stack.pop() {
                    out.push(idx);
                    stack.extend(self.node(idx).children.iter().rev().copied());
                }
            }
            TraversalOrder::PostOrder => {
                let mut stack = vec![(from, false)];
                while let Some((idx, expanded)) = stack.pop() {
                    if expanded {
                        out.push(idx);
                    } else {
                        stack.push((idx, true));
                        stack.extend(self.node(idx).children.iter().rev().map(|c| (*c, false)));
                    }
                }
            }
        }
        out
    }

    /// Append a metadata entry, tracing the caller's location.
    ///
    /// The trace is omitted when the `disable-stack-trace` context key is
    /// set on the node or an ancestor.
    #[track_caller]
    pub fn add_metadata(&mut self, idx: NodeIdx, entry_type: impl Into<String>, data: Value) {
        let trace = if self.traces_disabled(idx) {
            None
        } else {
            Some(vec![caller_trace()])
        };
        self.node_mut(idx).metadata.push(MetadataEntry {
            entry_type: entry_type.into(),
            data: Some(data),
            trace,
        });
    }

    /// Append an informational annotation.
    #[track_caller]
    pub fn add_info(&mut self, idx: NodeIdx, message: impl Into<String>) {
        self.add_metadata(idx, metadata::INFO, Value::String(message.into()));
    }

    /// Append a warning annotation (an error in strict mode).
    #[track_caller]
    pub fn add_warning(&mut self, idx: NodeIdx, message: impl Into<String>) {
        self.add_metadata(idx, metadata::WARNING, Value::String(message.into()));
    }

    /// Append an error annotation; synthesis will fail validation.
    #[track_caller]
    pub fn add_error(&mut self, idx: NodeIdx, message: impl Into<String>) {
        self.add_metadata(idx, metadata::ERROR, Value::String(message.into()));
    }

    pub fn metadata(&self, idx: NodeIdx) -> &[MetadataEntry] {
        &self.node(idx).metadata
    }

    fn traces_disabled(&self, idx: NodeIdx) -> bool {
        match self.try_get_context(idx, DISABLE_STACK_TRACE) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// Record that `target` must be deployed before `source`.
    ///
    /// Duplicate edges are ignored. Cycles through several nodes are
    /// detected during synthesis.
    pub fn add_dependency(&mut self, source: NodeIdx, target: NodeIdx) -> Result<(), StructuralError> {
        if source == target {
            return Err(StructuralError::SelfDependency {
                path: self.path(source),
            });
        }
        let deps = &mut self.node_mut(source).dependencies;
        if !deps.contains(&target) {
            deps.push(target);
        }
        Ok(())
    }

    pub fn dependencies(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.node(idx).dependencies
    }

    /// Set a context value visible to this node and its future descendants.
    ///
    /// # Errors
    ///
    /// - `ContextAfterChildren` once the node has any child
    /// - `Locked` once the node is locked
    pub fn set_context(
        &mut self,
        idx: NodeIdx,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), StructuralError> {
        let key = key.into();
        let node = self.node(idx);
        if node.locked {
            return Err(StructuralError::Locked {
                path: self.path(idx),
            });
        }
        if !node.children.is_empty() {
            return Err(StructuralError::ContextAfterChildren {
                path: self.path(idx),
                key,
            });
        }
        self.node_mut(idx).context.insert(key, value);
        Ok(())
    }

    /// Look up a context value on the node or its nearest ancestor.
    pub fn try_get_context(&self, idx: NodeIdx, key: &str) -> Option<&Value> {
        let mut current = Some(idx);
        while let Some(n) = current {
            let node = self.node(n);
            if let Some(v) = node.context.get(key) {
                return Some(v);
            }
            current = node.parent;
        }
        None
    }

    /// Schedule an aspect for this node and every descendant.
    pub fn apply_aspect(&mut self, idx: NodeIdx, aspect: Rc<dyn Aspect>) {
        self.node_mut(idx).aspects.push(aspect);
    }

    /// Attach prepare/validate hooks to a node.
    pub fn add_hooks(&mut self, idx: NodeIdx, hooks: Rc<dyn ConstructHooks>) {
        self.node_mut(idx).hooks.push(hooks);
    }

    pub(crate) fn aspect_count(&self) -> usize {
        self.nodes.iter().map(|n| n.aspects.len()).sum()
    }

    /// Lock every node: no further children or context changes.
    pub fn lock(&mut self) {
        for node in &mut self.nodes {
            node.locked = true;
        }
    }

    pub fn is_locked(&self, idx: NodeIdx) -> bool {
        self.node(idx).locked
    }

    /// Let aspects add nodes to the locked tree.
    pub(crate) fn open_aspect_window(&mut self) {
        self.aspect_window = true;
    }

    /// Close the aspect window and lock whatever it created.
    pub(crate) fn close_aspect_window(&mut self) {
        self.aspect_window = false;
        self.lock();
    }

    /// Record a context key that a provider needs but nobody supplied.
    pub fn report_missing(&mut self, missing: MissingContext) {
        self.missing.entry(missing.key.clone()).or_insert(missing);
    }

    /// Missing context entries, sorted by key.
    pub fn missing(&self) -> impl Iterator<Item = &MissingContext> {
        self.missing.values()
    }

    // ---- deployment units ----

    /// Nearest ancestor-or-self that is a deployment unit.
    pub fn unit_of(&self, idx: NodeIdx) -> Option<NodeIdx> {
        let mut current = Some(idx);
        while let Some(n) = current {
            if matches!(self.node(n).kind, NodeKind::Stack(_)) {
                return Some(n);
            }
            current = self.node(n).parent;
        }
        None
    }

    /// Nearest strict ancestor that is a deployment unit.
    pub fn parent_unit(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.parent(idx).and_then(|p| self.unit_of(p))
    }

    /// Enclosing deployment units from the outermost down to `unit`.
    pub fn unit_chain(&self, unit: NodeIdx) -> Vec<NodeIdx> {
        let mut chain = vec![unit];
        let mut current = self.parent_unit(unit);
        while let Some(u) = current {
            chain.push(u);
            current = self.parent_unit(u);
        }
        chain.reverse();
        chain
    }

    /// Outermost deployment unit enclosing `idx`.
    pub fn top_unit_of(&self, idx: NodeIdx) -> Option<NodeIdx> {
        self.unit_of(idx)
            .and_then(|u| self.unit_chain(u).first().copied())
    }

    /// Every deployment unit, in pre-order.
    pub fn units(&self) -> Vec<NodeIdx> {
        self.find_all(self.root(), TraversalOrder::PreOrder)
            .into_iter()
            .filter(|n| matches!(self.node(*n).kind, NodeKind::Stack(_)))
            .collect()
    }

    pub fn stack(&self, idx: NodeIdx) -> Option<&StackData> {
        match &self.node(idx).kind {
            NodeKind::Stack(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn stack_mut(&mut self, idx: NodeIdx) -> Option<&mut StackData> {
        match &mut self.node_mut(idx).kind {
            NodeKind::Stack(data) => Some(data),
            _ => None,
        }
    }

    pub fn resource(&self, idx: NodeIdx) -> Option<&ResourceData> {
        match &self.node(idx).kind {
            NodeKind::Resource(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn resource_mut(&mut self, idx: NodeIdx) -> Option<&mut ResourceData> {
        match &mut self.node_mut(idx).kind {
            NodeKind::Resource(data) => Some(data),
            _ => None,
        }
    }

    /// Template key of a resource or nested stack within its unit.
    ///
    /// Derived from the path relative to the enclosing unit unless the
    /// resource carries an override. Nodes outside any unit have none.
    pub fn logical_id(&self, idx: NodeIdx) -> Option<String> {
        if let Some(overridden) = self.resource(idx).and_then(|r| r.logical_id_override()) {
            return Some(overridden.to_string());
        }

        let unit = if self.stack(idx).is_some() {
            self.parent_unit(idx)?
        } else {
            self.unit_of(idx)?
        };

        let scopes = self.scopes(idx);
        let start = scopes.iter().position(|n| *n == unit)? + 1;
        let components: Vec<&str> = scopes[start..].iter().map(|n| self.id(*n)).collect();
        Some(make_unique_id(&components))
    }
}

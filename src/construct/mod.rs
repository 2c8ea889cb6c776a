//! construct
//!
//! The construct tree: identity, scoping, metadata, dependencies, aspects
//! and lifecycle locks.
//!
//! # Modules
//!
//! - [`tree`] - The node arena and its structural operations
//! - [`metadata`] - Well-known metadata types and trace capture
//! - [`aspect`] - Aspects, prepare/validate hooks and the aspect loop
//! - [`context`] - Missing-context protocol for context providers

pub mod aspect;
pub mod context;
pub mod metadata;
pub mod tree;

pub use aspect::{invoke_aspects, Aspect, AspectError, ConstructHooks, DEFAULT_MAX_ASPECT_PASSES};
pub use tree::{Node, NodeIdx, NodeKind, StructuralError, TraversalOrder, Tree};

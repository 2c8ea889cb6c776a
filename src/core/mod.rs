//! core
//!
//! Core domain types and the building blocks the other layers share.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ConstructId, LogicalId, Environment, etc.
//! - [`naming`] - Unique-id derivation for logical ids and exports
//! - [`graph`] - Dependency graph with cycle detection and ordering
//! - [`paths`] - Cloud Assembly file layout and atomic writes
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Schemas are strict and self-describing
//! - Every ordering is deterministic

pub mod config;
pub mod graph;
pub mod naming;
pub mod paths;
pub mod types;

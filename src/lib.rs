//! cxsynth - construct trees, lazy tokens and Cloud Assembly synthesis
//!
//! A program builds a tree of constructs: stacks (deployment units),
//! resources and plain grouping nodes. Values that are only known late are
//! carried as tokens. Synthesis locks the tree, runs aspects and hooks,
//! wires references between stacks, validates, and writes a Cloud Assembly:
//! one template per stack plus a versioned `manifest.json`.
//!
//! # Architecture
//!
//! - [`core`] - Strong types, naming, dependency graph, paths and config
//! - [`token`] - Token encoding, registry and resolution
//! - [`construct`] - The construct tree, metadata, aspects and context
//! - [`stack`] - Stacks, resources, assets and template rendering
//! - [`reference`] - Cross-stack references and their materialization
//! - [`synth`] - The synthesis phases and the [`synth::App`] facade
//! - [`assembly`] - The manifest contract: schema, adapters and reader
//! - [`cli`] - The `cxasm` command line
//!
//! # Invariants
//!
//! 1. Synthesis writes nothing until validation has passed
//! 2. `manifest.json` is written last and atomically
//! 3. Synthesizing the same tree twice gives byte-identical output
//! 4. Manifests newer than the supported major are rejected

pub mod assembly;
pub mod cli;
pub mod construct;
pub mod core;
pub mod reference;
pub mod stack;
pub mod synth;
pub mod token;

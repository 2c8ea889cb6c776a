//! synth
//!
//! Turns a construct tree into a Cloud Assembly directory.
//!
//! # Phases
//!
//! 1. **Lock**: every node is locked; no further children or context
//! 2. **Aspects**: applied aspects visit their subtrees in pre-order; the
//!    nodes they create are locked when the phase ends
//! 3. **Prepare**: `prepare` hooks run in post-order, node dependencies
//!    are checked for cycles and propagated to templates and units, every
//!    template is resolved once in the preparing phase to discover
//!    references, and cross-unit references are materialized
//! 4. **Validate**: `validate` hooks and error annotations are collected;
//!    any failure aborts before a file is written
//! 5. **Emit**: templates, asset manifests and the tree dump are resolved
//!    in memory, written, and `manifest.json` is written atomically last
//!
//! # Invariants
//!
//! - Phases 1 to 4 and the in-memory part of phase 5 never touch the
//!   output directory
//! - State derived by a run is reset at its start, so synthesizing the
//!   same tree twice produces byte-identical output
//!
//! # Example
//!
//! ```
//! use cxsynth::construct::Tree;
//! use cxsynth::stack::{Resource, Stack, StackProps};
//! use cxsynth::synth::{synthesize, SynthOptions};
//! use serde_json::json;
//!
//! let mut tree = Tree::new();
//! let root = tree.root();
//! let app = Stack::new(&mut tree, root, "App", StackProps::default()).unwrap();
//! Resource::new(&mut tree, app.node(), "Bucket", "AWS::S3::Bucket", json!({})).unwrap();
//!
//! let out = tempfile::tempdir().unwrap();
//! let manifest = synthesize(&mut tree, out.path(), &SynthOptions::default()).unwrap();
//! assert!(manifest.artifacts.contains_key("App"));
//! assert!(out.path().join("App.template.json").exists());
//! ```

pub mod app;
pub mod dependencies;
pub mod emit;

pub use app::App;
pub use emit::{render_assembly, write_assembly, Assembly};

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assembly::{AssemblyManifest, ManifestError};
use crate::construct::metadata::{self, is_error};
use crate::core::config::ConfigError;
use crate::construct::{
    invoke_aspects, AspectError, NodeIdx, StructuralError, TraversalOrder, Tree,
    DEFAULT_MAX_ASPECT_PASSES,
};
use crate::reference::{materialize, ReferenceError, ReferenceRecorder};
use crate::stack::template::RenderOptions;
use crate::stack::{render_template, DerivedState};
use crate::token::{
    resolve, IntrinsicConcat, ResolveContext, ResolveError, ResolveOptions,
    DEFAULT_MAX_REDUCTIONS,
};

/// Knobs of one synthesis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthOptions {
    /// Treat warning annotations as errors.
    pub strict: bool,
    /// Report this library under `runtime.libraries`.
    pub version_reporting: bool,
    /// Write `tree.json`.
    pub tree_metadata: bool,
    /// Add `aws:cdk:path` metadata to rendered resources.
    pub path_metadata: bool,
    pub max_token_reductions: usize,
    pub max_aspect_passes: usize,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            strict: false,
            version_reporting: true,
            tree_metadata: true,
            path_metadata: true,
            max_token_reductions: DEFAULT_MAX_REDUCTIONS,
            max_aspect_passes: DEFAULT_MAX_ASPECT_PASSES,
        }
    }
}

impl SynthOptions {
    pub(crate) fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            max_reductions: self.max_token_reductions,
        }
    }

    pub(crate) fn render_options(&self) -> RenderOptions {
        RenderOptions {
            path_metadata: self.path_metadata,
        }
    }
}

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Path of the failing node; empty for the root.
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[/{}] {}", self.path, self.message)
    }
}

/// Every failure collected during validation.
#[derive(Debug, Clone, Error)]
#[error("validation failed with {} error(s):\n{}", .failures.len(), list_failures(.failures))]
pub struct ValidationError {
    pub failures: Vec<ValidationFailure>,
}

fn list_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors from synthesis.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Aspect(#[from] AspectError),

    #[error(transparent)]
    Resolve(ResolveError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("assembly output may be incomplete: {0}")]
    Emit(Box<SynthError>),
}

impl From<ResolveError> for SynthError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Reference(reference) => SynthError::Reference(reference),
            other => SynthError::Resolve(other),
        }
    }
}

impl SynthError {
    /// Whether files may already have been written to the output directory.
    pub fn output_may_be_partial(&self) -> bool {
        matches!(self, SynthError::Emit(_))
    }
}

/// Run every phase and write the assembly to `outdir`.
pub fn synthesize(
    tree: &mut Tree,
    outdir: &Path,
    options: &SynthOptions,
) -> Result<AssemblyManifest, SynthError> {
    run_phases(tree, options)?;

    let assembly = render_assembly(tree, options)?;
    write_assembly(&assembly, outdir).map_err(|e| SynthError::Emit(Box::new(e)))?;

    info!(
        outdir = %outdir.display(),
        artifacts = assembly.manifest.artifacts.len(),
        "synthesized cloud assembly"
    );
    Ok(assembly.manifest)
}

/// Phases lock, aspects, prepare and validate.
///
/// After success the tree is ready for [`render_assembly`].
pub fn run_phases(tree: &mut Tree, options: &SynthOptions) -> Result<(), SynthError> {
    tree.lock();
    debug!(nodes = tree.len(), "tree locked");

    tree.open_aspect_window();
    let aspects = invoke_aspects(tree, options.max_aspect_passes);
    tree.close_aspect_window();
    let passes = aspects?;
    debug!(passes, nodes = tree.len(), "aspects applied");

    prepare(tree, options)?;
    validate(tree, options.strict)?;
    debug!("validation passed");
    Ok(())
}

fn prepare(tree: &mut Tree, options: &SynthOptions) -> Result<(), SynthError> {
    for unit in tree.units() {
        if let Some(data) = tree.stack_mut(unit) {
            data.derived = DerivedState::default();
        }
    }
    for reference in tree.tokens().references() {
        reference.clear_replacements();
    }

    let root = tree.root();
    for idx in tree.find_all(root, TraversalOrder::PostOrder) {
        let hooks = tree.node(idx).hooks.clone();
        for hook in hooks {
            hook.prepare(tree, idx)?;
        }
    }

    dependencies::check_node_cycles(tree)?;
    dependencies::propagate(tree)?;

    let recorder = ReferenceRecorder::new();
    {
        let ctx = ResolveContext::new(tree, root)
            .preparing(&recorder)
            .with_options(options.resolve_options())
            .with_concat(&IntrinsicConcat);
        for unit in tree.units() {
            let template = render_template(tree, unit, options.render_options())?;
            resolve(&template, &ctx.with_scope(unit))?;
            resolve(&emit::unit_metadata(tree, unit), &ctx.with_scope(unit))?;
        }
    }
    let uses = recorder.into_uses();
    let wired = materialize(tree, &uses)?;
    debug!(uses = uses.len(), wired, "references materialized");

    dependencies::check_unit_cycles(tree)?;
    Ok(())
}

fn validate(tree: &Tree, strict: bool) -> Result<(), ValidationError> {
    let mut failures = Vec::new();

    for idx in tree.find_all(tree.root(), TraversalOrder::PreOrder) {
        for hook in &tree.node(idx).hooks {
            for message in hook.validate(tree, idx) {
                failures.push(failure(tree, idx, message));
            }
        }

        for entry in tree.metadata(idx) {
            let message = match &entry.data {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            if is_error(&entry.entry_type, strict) {
                failures.push(failure(tree, idx, message));
            } else if entry.entry_type == metadata::WARNING {
                warn!(path = %tree.path(idx), "{message}");
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { failures })
    }
}

fn failure(tree: &Tree, idx: NodeIdx, message: String) -> ValidationFailure {
    ValidationFailure {
        path: tree.path(idx),
        message,
    }
}

//! synth::app
//!
//! The root of a construct program: a tree, synthesis options and the
//! directory the assembly is written to.

use std::path::{Path, PathBuf};

use crate::assembly::AssemblyManifest;
use crate::construct::metadata::DISABLE_STACK_TRACE;
use crate::construct::{NodeIdx, Tree};
use crate::core::config::{Config, DEFAULT_OUTPUT};

use super::{synthesize, SynthError, SynthOptions};

/// A construct tree ready to be synthesized.
///
/// # Example
///
/// ```
/// use cxsynth::stack::{Stack, StackProps};
/// use cxsynth::synth::App;
///
/// let out = tempfile::tempdir().unwrap();
/// let mut app = App::new().with_outdir(out.path());
/// let root = app.root();
/// Stack::new(app.tree_mut(), root, "Web", StackProps::default()).unwrap();
///
/// let manifest = app.synth().unwrap();
/// assert!(manifest.artifacts.contains_key("Web"));
/// ```
pub struct App {
    tree: Tree,
    options: SynthOptions,
    outdir: PathBuf,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// An empty app writing to `cdk.out` with default options.
    pub fn new() -> Self {
        Self::with_options(SynthOptions::default())
    }

    pub fn with_options(options: SynthOptions) -> Self {
        Self {
            tree: Tree::new(),
            options,
            outdir: PathBuf::from(DEFAULT_OUTPUT),
        }
    }

    /// An app configured from loaded config files.
    ///
    /// Config context is seeded into the root node before any construct is
    /// added.
    pub fn from_config(config: &Config) -> Result<Self, SynthError> {
        let mut app = Self::with_options(config.synth_options());
        app.outdir = config.output();

        let root = app.tree.root();
        for (key, value) in config.context()? {
            app.tree.set_context(root, key, value)?;
        }
        if config.disable_stack_traces() {
            app.tree
                .set_context(root, DISABLE_STACK_TRACE, serde_json::Value::Bool(true))?;
        }
        Ok(app)
    }

    pub fn with_outdir(mut self, outdir: impl AsRef<Path>) -> Self {
        self.outdir = outdir.as_ref().to_path_buf();
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeIdx {
        self.tree.root()
    }

    pub fn options(&self) -> &SynthOptions {
        &self.options
    }

    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// Synthesize the tree into [`outdir`](Self::outdir).
    ///
    /// Repeated calls produce the same assembly.
    pub fn synth(&mut self) -> Result<AssemblyManifest, SynthError> {
        synthesize(&mut self.tree, &self.outdir, &self.options)
    }
}

//! core::paths
//!
//! Centralized path routing for Cloud Assembly files.
//!
//! # Layout
//!
//! Everything lives directly under the output directory:
//! - `manifest.json` - The assembly manifest
//! - `<artifact>.template.json` - One template per top-level stack
//! - `<artifact>.nested.template.json` - One template per nested stack
//! - `<artifact>.assets.json` - Asset manifest of a stack with assets
//! - `asset.<hash><ext>` - Content-addressed asset copies
//! - `tree.json` - Construct tree dump
//!
//! No code outside this module joins file names onto the output directory.
//!
//! # Example
//!
//! ```
//! use cxsynth::core::paths::AssemblyPaths;
//! use std::path::PathBuf;
//!
//! let paths = AssemblyPaths::new("cdk.out");
//! assert_eq!(paths.manifest(), PathBuf::from("cdk.out/manifest.json"));
//! assert_eq!(paths.file("App.template.json"), PathBuf::from("cdk.out/App.template.json"));
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File name of the manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name of the tree dump.
pub const TREE_FILE: &str = "tree.json";

/// Path routing for one assembly directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyPaths {
    /// The assembly directory.
    pub outdir: PathBuf,
}

impl AssemblyPaths {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
        }
    }

    /// Path to `manifest.json`.
    pub fn manifest(&self) -> PathBuf {
        self.outdir.join(MANIFEST_FILE)
    }

    /// Path to `tree.json`.
    pub fn tree(&self) -> PathBuf {
        self.outdir.join(TREE_FILE)
    }

    /// Path to a file named in the manifest.
    pub fn file(&self, name: &str) -> PathBuf {
        self.outdir.join(name)
    }

    /// Resolve a `manifest.json` path or an assembly directory.
    pub fn locate(path: &Path) -> Self {
        if path.file_name().is_some_and(|n| n == MANIFEST_FILE) {
            Self::new(path.parent().map(Path::to_path_buf).unwrap_or_default())
        } else {
            Self::new(path)
        }
    }
}

/// Write a file atomically: write a temporary sibling, sync it, rename.
///
/// Parent directories are created as needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)
}

//! assembly
//!
//! The versioned Cloud Assembly manifest: writing, reading and validation.
//!
//! # Modules
//!
//! - [`schema`] - Manifest types and the authoritative version constant
//! - [`adapters`] - In-memory upgrades of older majors
//! - [`reader`] - [`CloudAssembly`], an opened assembly directory
//!
//! # Loading
//!
//! 1. Read the file and parse it as JSON
//! 2. Read only the `version` envelope and reject a newer major
//! 3. Upgrade older majors through [`adapters`]
//! 4. Parse the typed manifest (unknown fields and types rejected)
//! 5. Validate references between artifacts and their acyclicity
//!
//! # Example
//!
//! ```
//! use cxsynth::assembly::{self, schema::AssemblyManifest};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("manifest.json");
//!
//! let manifest = AssemblyManifest::new();
//! assembly::save(&manifest, &path).unwrap();
//! assert_eq!(assembly::load(&path).unwrap(), manifest);
//! ```

pub mod adapters;
pub mod reader;
pub mod schema;

pub use reader::CloudAssembly;
pub use schema::{ArtifactManifest, ArtifactType, AssemblyManifest, ASSEMBLY_VERSION};

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::graph::DependencyGraph;
use crate::core::paths::write_atomic;
use crate::core::types::{Environment, SchemaVersion, TypeError};

/// Errors from manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed manifest: {0}")]
    Parse(String),

    #[error("invalid manifest version: {0}")]
    Version(#[from] TypeError),

    #[error("manifest version {found} is not supported (maximum {max})")]
    UnsupportedVersion {
        found: SchemaVersion,
        max: SchemaVersion,
    },

    #[error("schema violation: {0}")]
    Schema(String),

    #[error("artifact '{artifact}' depends on unknown artifact '{dependency}'")]
    UnknownDependency { artifact: String, dependency: String },

    #[error("artifact dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("artifact '{artifact}' refers to missing file {}", path.display())]
    MissingFile { artifact: String, path: PathBuf },
}

/// Envelope for version dispatch before full parsing.
#[derive(Debug, Deserialize)]
struct ManifestEnvelope {
    version: String,
}

/// Serialize a manifest: pretty JSON, sorted keys, trailing newline.
pub fn to_json(manifest: &AssemblyManifest) -> Result<String, ManifestError> {
    let mut json =
        serde_json::to_string_pretty(manifest).map_err(|e| ManifestError::Parse(e.to_string()))?;
    json.push('\n');
    Ok(json)
}

/// Write a manifest atomically.
///
/// Only manifests stamped with [`ASSEMBLY_VERSION`] are written.
pub fn save(manifest: &AssemblyManifest, path: &Path) -> Result<(), ManifestError> {
    if manifest.version != ASSEMBLY_VERSION {
        return Err(ManifestError::Schema(format!(
            "cannot write manifest version {}; this library writes {}",
            manifest.version, ASSEMBLY_VERSION
        )));
    }
    let json = to_json(manifest)?;
    write_atomic(path, json.as_bytes()).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), artifacts = manifest.artifacts.len(), "saved manifest");
    Ok(())
}

/// Read and validate a manifest written by this or an older major.
pub fn load(path: &Path) -> Result<AssemblyManifest, ManifestError> {
    load_with_max(path, ASSEMBLY_VERSION)
}

/// Read and validate a manifest, rejecting majors above `max`.
pub fn load_with_max(path: &Path, max: SchemaVersion) -> Result<AssemblyManifest, ManifestError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_with_max(&text, max)
}

/// Parse and validate manifest text.
///
/// # Errors
///
/// - [`ManifestError::Parse`] if the text is not a JSON object with a
///   string `version`
/// - [`ManifestError::UnsupportedVersion`] if the major exceeds `max`
/// - [`ManifestError::Schema`] for unknown fields, unknown artifact types
///   or malformed properties
/// - [`ManifestError::UnknownDependency`] / [`ManifestError::DependencyCycle`]
///   if artifact dependencies do not form a DAG over known ids
pub fn parse_with_max(text: &str, max: SchemaVersion) -> Result<AssemblyManifest, ManifestError> {
    let raw: Value = serde_json::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))?;

    let envelope: ManifestEnvelope =
        serde_json::from_value(raw.clone()).map_err(|e| ManifestError::Parse(e.to_string()))?;
    let found = SchemaVersion::parse(&envelope.version)?;
    if found.major > max.major {
        return Err(ManifestError::UnsupportedVersion { found, max });
    }

    let Value::Object(fields) = raw else {
        return Err(ManifestError::Parse("manifest is not an object".to_string()));
    };
    let upgraded = adapters::upgrade(fields, found.major);

    let manifest: AssemblyManifest = serde_json::from_value(Value::Object(upgraded))
        .map_err(|e| ManifestError::Schema(e.to_string()))?;
    validate(&manifest)?;
    Ok(manifest)
}

/// Check the structural rules typed parsing cannot express.
pub fn validate(manifest: &AssemblyManifest) -> Result<(), ManifestError> {
    let mut graph = DependencyGraph::new();

    for (id, artifact) in &manifest.artifacts {
        graph.add_node(id.clone());
        for dependency in &artifact.dependencies {
            if !manifest.artifacts.contains_key(dependency) {
                return Err(ManifestError::UnknownDependency {
                    artifact: id.clone(),
                    dependency: dependency.clone(),
                });
            }
            graph.add_edge(id.clone(), dependency.clone());
        }

        if let Some(env) = &artifact.environment {
            Environment::parse(env)
                .map_err(|e| ManifestError::Schema(format!("artifact '{id}': {e}")))?;
        }

        let file = if artifact.artifact_type.is_stack() {
            artifact.stack_properties().map(|p| p.template_file)
        } else {
            artifact.file_properties().map(|p| p.file)
        };
        match file {
            Ok(name) if !name.is_empty() => {}
            Ok(_) => {
                return Err(ManifestError::Schema(format!(
                    "artifact '{id}' has an empty file name"
                )))
            }
            Err(e) => {
                return Err(ManifestError::Schema(format!(
                    "artifact '{id}' ({}): {e}",
                    artifact.artifact_type
                )))
            }
        }
    }

    if let Some(cycle) = graph.find_cycle() {
        return Err(ManifestError::DependencyCycle(cycle));
    }
    Ok(())
}

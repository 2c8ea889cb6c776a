//! assembly::reader
//!
//! An opened Cloud Assembly directory.

use std::fs;
use std::path::Path;

use serde_json::Value;

use super::schema::{ArtifactManifest, ArtifactType, AssemblyManifest, ASSEMBLY_VERSION};
use super::{load_with_max, ManifestError};
use crate::core::graph::DependencyGraph;
use crate::core::paths::AssemblyPaths;
use crate::core::types::SchemaVersion;

/// A validated assembly whose referenced files all exist.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    paths: AssemblyPaths,
    manifest: AssemblyManifest,
}

impl CloudAssembly {
    /// Open a directory or a `manifest.json` path.
    pub fn open(path: &Path) -> Result<Self, ManifestError> {
        Self::open_with_max(path, ASSEMBLY_VERSION)
    }

    /// Open, rejecting manifest majors above `max`.
    pub fn open_with_max(path: &Path, max: SchemaVersion) -> Result<Self, ManifestError> {
        let paths = AssemblyPaths::locate(path);
        let manifest = load_with_max(&paths.manifest(), max)?;

        for (id, artifact) in &manifest.artifacts {
            if let Some(file) = artifact.file() {
                let path = paths.file(&file);
                if !path.is_file() {
                    return Err(ManifestError::MissingFile {
                        artifact: id.clone(),
                        path,
                    });
                }
            }
        }

        Ok(Self { paths, manifest })
    }

    pub fn directory(&self) -> &Path {
        &self.paths.outdir
    }

    pub fn manifest(&self) -> &AssemblyManifest {
        &self.manifest
    }

    pub fn artifact(&self, id: &str) -> Option<&ArtifactManifest> {
        self.manifest.artifacts.get(id)
    }

    /// Ids of deployable top-level stacks.
    pub fn stacks(&self) -> Vec<&str> {
        self.manifest
            .artifacts_of(ArtifactType::AwsCloudformationStack)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Parsed template of a stack artifact.
    pub fn template(&self, id: &str) -> Result<Value, ManifestError> {
        let artifact = self
            .artifact(id)
            .filter(|a| a.artifact_type.is_stack())
            .ok_or_else(|| ManifestError::Schema(format!("no stack artifact '{id}'")))?;
        let props = artifact
            .stack_properties()
            .map_err(|e| ManifestError::Schema(e.to_string()))?;
        self.read_json(&props.template_file)
    }

    /// Parsed `tree.json`, if the assembly has a tree artifact.
    pub fn tree(&self) -> Result<Option<Value>, ManifestError> {
        match self.manifest.artifacts_of(ArtifactType::CdkTree).next() {
            Some((_, artifact)) => match artifact.file() {
                Some(file) => self.read_json(&file).map(Some),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Every artifact id, dependencies first, ties broken by id.
    pub fn deploy_order(&self) -> Result<Vec<String>, ManifestError> {
        let mut graph = DependencyGraph::new();
        for (id, artifact) in &self.manifest.artifacts {
            graph.add_node(id.clone());
            for dependency in &artifact.dependencies {
                graph.add_edge(id.clone(), dependency.clone());
            }
        }
        graph.topological_order().map_err(ManifestError::DependencyCycle)
    }

    fn read_json(&self, file: &str) -> Result<Value, ManifestError> {
        let path = self.paths.file(file);
        let text = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text)
            .map_err(|e| ManifestError::Parse(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::save;
    use serde_json::json;

    fn write_assembly(dir: &Path, with_template: bool) {
        let manifest: AssemblyManifest = serde_json::from_value(json!({
            "version": "4.0.0",
            "artifacts": {
                "Web": {
                    "type": "aws-cloudformation-stack",
                    "dependencies": ["Db"],
                    "properties": {"templateFile": "Web.template.json"}
                },
                "Db": {
                    "type": "aws-cloudformation-stack",
                    "properties": {"templateFile": "Db.template.json"}
                }
            }
        }))
        .unwrap();
        save(&manifest, &dir.join("manifest.json")).unwrap();
        fs::write(dir.join("Db.template.json"), r#"{"Resources": {}}"#).unwrap();
        if with_template {
            fs::write(dir.join("Web.template.json"), r#"{"Resources": {"R": {"Type": "T"}}}"#)
                .unwrap();
        }
    }

    #[test]
    fn opens_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        write_assembly(dir.path(), true);

        let assembly = CloudAssembly::open(dir.path()).unwrap();
        assert_eq!(assembly.stacks(), vec!["Db", "Web"]);
        assert_eq!(assembly.deploy_order().unwrap(), vec!["Db", "Web"]);
        assert_eq!(assembly.template("Web").unwrap()["Resources"]["R"]["Type"], json!("T"));
        assert!(assembly.tree().unwrap().is_none());
    }

    #[test]
    fn accepts_manifest_path() {
        let dir = tempfile::tempdir().unwrap();
        write_assembly(dir.path(), true);
        let assembly = CloudAssembly::open(&dir.path().join("manifest.json")).unwrap();
        assert_eq!(assembly.directory(), dir.path());
    }

    #[test]
    fn missing_template_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_assembly(dir.path(), false);
        let err = CloudAssembly::open(dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingFile { artifact, .. } if artifact == "Web"));
    }
}

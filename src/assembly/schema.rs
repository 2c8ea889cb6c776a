//! assembly::schema
//!
//! Cloud Assembly manifest schema.
//!
//! # Schema Design
//!
//! - The `version` field is written from [`ASSEMBLY_VERSION`] only
//! - Every change to the format bumps the major component
//! - Top-level fields and artifact entries are strictly parsed (unknown
//!   fields rejected); `properties` depend on the artifact type and are
//!   read through typed views
//!
//! # Example
//!
//! ```
//! use cxsynth::assembly::schema::{ArtifactManifest, ArtifactType, AssemblyManifest};
//!
//! let mut manifest = AssemblyManifest::new();
//! manifest.artifacts.insert(
//!     "Tree".into(),
//!     ArtifactManifest::new(ArtifactType::CdkTree),
//! );
//!
//! let json = serde_json::to_string(&manifest).unwrap();
//! assert!(json.contains("\"type\":\"cdk-tree\""));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::SchemaVersion;

/// Version of the manifest format this crate writes and reads.
pub const ASSEMBLY_VERSION: SchemaVersion = SchemaVersion::new(4, 0, 0);

/// Name reported under `runtime.libraries`.
pub const LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");

/// Version reported under `runtime.libraries`.
pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The manifest of a Cloud Assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssemblyManifest {
    pub version: SchemaVersion,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeInfo>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactManifest>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MissingContext>,
}

impl AssemblyManifest {
    /// An empty manifest at the current version.
    pub fn new() -> Self {
        Self {
            version: ASSEMBLY_VERSION,
            runtime: None,
            artifacts: BTreeMap::new(),
            missing: Vec::new(),
        }
    }

    /// Artifacts of one type, in id order.
    pub fn artifacts_of(&self, kind: ArtifactType) -> impl Iterator<Item = (&String, &ArtifactManifest)> {
        self.artifacts
            .iter()
            .filter(move |(_, a)| a.artifact_type == kind)
    }
}

impl Default for AssemblyManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Libraries that produced the assembly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeInfo {
    pub libraries: BTreeMap<String, String>,
}

/// Kind of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    /// A deployable top-level stack.
    AwsCloudformationStack,
    /// A stack deployed through its parent's template.
    NestedCloudformationStack,
    /// The construct tree dump.
    CdkTree,
    /// Files the deployer must publish.
    AssetManifest,
}

impl ArtifactType {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactType::AwsCloudformationStack => "aws-cloudformation-stack",
            ArtifactType::NestedCloudformationStack => "nested-cloudformation-stack",
            ArtifactType::CdkTree => "cdk-tree",
            ArtifactType::AssetManifest => "asset-manifest",
        }
    }

    /// Whether the artifact carries a template.
    pub fn is_stack(self) -> bool {
        matches!(
            self,
            ArtifactType::AwsCloudformationStack | ArtifactType::NestedCloudformationStack
        )
    }
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named entry of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArtifactManifest {
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,

    /// `scheme://account/region`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Ids of artifacts that must be deployed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Construct path to the metadata recorded there.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Vec<MetadataEntry>>,

    /// Type-specific properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ArtifactManifest {
    pub fn new(artifact_type: ArtifactType) -> Self {
        Self {
            artifact_type,
            environment: None,
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
            properties: None,
            display_name: None,
        }
    }

    /// Properties read as a stack's.
    pub fn stack_properties(&self) -> Result<StackProperties, serde_json::Error> {
        serde_json::from_value(self.properties.clone().unwrap_or(Value::Null))
    }

    /// Properties read as a file reference (tree dump, asset manifest).
    pub fn file_properties(&self) -> Result<FileProperties, serde_json::Error> {
        serde_json::from_value(self.properties.clone().unwrap_or(Value::Null))
    }

    /// File this artifact points at, if any.
    pub fn file(&self) -> Option<String> {
        if self.artifact_type.is_stack() {
            self.stack_properties().ok().map(|p| p.template_file)
        } else {
            self.file_properties().ok().map(|p| p.file)
        }
    }
}

/// Properties of a stack artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackProperties {
    pub template_file: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_protection: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_bootstrap_stack_version: Option<u64>,
}

/// Properties of an artifact backed by one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProperties {
    pub file: String,
}

/// One metadata entry attached to a construct path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataEntry {
    #[serde(rename = "type")]
    pub entry_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
}

/// A context value a provider needs and nobody supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissingContext {
    pub key: String,
    pub provider: String,
    pub props: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_types_are_kebab_case() {
        for kind in [
            ArtifactType::AwsCloudformationStack,
            ArtifactType::NestedCloudformationStack,
            ArtifactType::CdkTree,
            ArtifactType::AssetManifest,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }

    #[test]
    fn empty_collections_are_omitted() {
        let manifest = AssemblyManifest::new();
        assert_eq!(
            serde_json::to_value(&manifest).unwrap(),
            json!({"version": "4.0.0"})
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = json!({"version": "4.0.0", "extra": 1});
        assert!(serde_json::from_value::<AssemblyManifest>(json).is_err());

        let json = json!({"version": "4.0.0", "artifacts": {"A": {"type": "cdk-tree", "bogus": true}}});
        assert!(serde_json::from_value::<AssemblyManifest>(json).is_err());
    }

    #[test]
    fn unknown_artifact_type_is_rejected() {
        let json = json!({"version": "4.0.0", "artifacts": {"A": {"type": "mystery"}}});
        assert!(serde_json::from_value::<AssemblyManifest>(json).is_err());
    }

    #[test]
    fn stack_properties_view() {
        let mut artifact = ArtifactManifest::new(ArtifactType::AwsCloudformationStack);
        artifact.properties = Some(json!({
            "templateFile": "App.template.json",
            "terminationProtection": true
        }));
        let props = artifact.stack_properties().unwrap();
        assert_eq!(props.template_file, "App.template.json");
        assert_eq!(props.termination_protection, Some(true));
        assert_eq!(artifact.file().as_deref(), Some("App.template.json"));

        artifact.properties = None;
        assert!(artifact.stack_properties().is_err());
    }
}

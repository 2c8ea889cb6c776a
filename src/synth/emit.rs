//! synth::emit
//!
//! The emit phase: final resolution, manifest assembly and file output.
//!
//! [`render_assembly`] builds every file in memory; [`write_assembly`] is
//! the only function that touches the output directory. The manifest is
//! removed first and written last, so a directory holding a manifest is
//! always complete.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::debug;

use super::{SynthError, SynthOptions};
use crate::assembly;
use crate::assembly::schema::{
    ArtifactManifest, ArtifactType, AssemblyManifest, MetadataEntry, RuntimeInfo, StackProperties,
    ASSEMBLY_VERSION, LIBRARY_NAME, LIBRARY_VERSION,
};
use crate::construct::metadata::{LOGICAL_ID, STACK_TAGS};
use crate::construct::{NodeIdx, NodeKind, Tree};
use crate::core::paths::{write_atomic, AssemblyPaths, TREE_FILE};
use crate::stack::template::unit_elements;
use crate::stack::{render_template, StackData, REQUIRED_BOOTSTRAP_VERSION};
use crate::token::{resolve, IntrinsicConcat, ResolveContext};

/// Artifact id of the tree dump.
pub const TREE_ARTIFACT_ID: &str = "Tree";

/// Version tag of `tree.json`.
pub const TREE_VERSION: &str = "tree-0.1";

/// Id the root node carries in the tree dump.
pub const ROOT_DISPLAY_ID: &str = "App";

/// A fully rendered assembly, not yet written.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub manifest: AssemblyManifest,
    /// File name to contents.
    pub files: BTreeMap<String, Vec<u8>>,
    /// Asset file name to the source it is copied from.
    pub assets: BTreeMap<String, PathBuf>,
}

/// Resolve every template and build the manifest.
pub fn render_assembly(tree: &Tree, options: &SynthOptions) -> Result<Assembly, SynthError> {
    let ctx = ResolveContext::new(tree, tree.root())
        .with_options(options.resolve_options())
        .with_concat(&IntrinsicConcat);

    let mut manifest = AssemblyManifest::new();
    let mut files = BTreeMap::new();
    let mut assets = BTreeMap::new();

    if options.version_reporting {
        manifest.runtime = Some(RuntimeInfo {
            libraries: BTreeMap::from([(LIBRARY_NAME.to_string(), LIBRARY_VERSION.to_string())]),
        });
    }

    for unit in tree.units() {
        let Some(data) = tree.stack(unit) else {
            continue;
        };
        let scoped = ctx.with_scope(unit);

        let template = resolve(&render_template(tree, unit, options.render_options())?, &scoped)?;
        files.insert(data.template_file(), to_pretty(&template, &data.template_file())?);

        let mut artifact = ArtifactManifest::new(if data.is_nested() {
            ArtifactType::NestedCloudformationStack
        } else {
            ArtifactType::AwsCloudformationStack
        });
        artifact.environment = Some(data.environment().to_string());
        artifact.display_name = Some(tree.path(unit));

        let mut dependencies: BTreeSet<String> = data
            .derived()
            .unit_dependencies
            .iter()
            .filter_map(|u| tree.stack(*u))
            .map(|s| s.artifact_id().to_string())
            .collect();
        dependencies.extend(
            unit_elements(tree, unit)
                .into_iter()
                .filter_map(|e| tree.stack(e))
                .map(|s| s.artifact_id().to_string()),
        );

        if !data.assets().is_empty() {
            let (id, asset_artifact, file, contents) = asset_manifest(data)?;
            for asset in data.assets() {
                assets.insert(asset.file_name(), asset.source.clone());
            }
            files.insert(file, contents);
            dependencies.insert(id.clone());
            manifest.artifacts.insert(id, asset_artifact);
        }
        artifact.dependencies = dependencies.into_iter().collect();

        let metadata = resolve(&unit_metadata(tree, unit), &scoped)?;
        artifact.metadata = serde_json::from_value(metadata).map_err(|source| SynthError::Serialize {
            what: format!("metadata of {}", data.artifact_id()),
            source,
        })?;

        let properties = stack_properties(data);
        artifact.properties =
            Some(serde_json::to_value(properties).map_err(|source| SynthError::Serialize {
                what: format!("properties of {}", data.artifact_id()),
                source,
            })?);

        manifest
            .artifacts
            .insert(data.artifact_id().to_string(), artifact);
    }

    if options.tree_metadata {
        let dump = json!({
            "version": TREE_VERSION,
            "tree": dump_node(tree, tree.root(), &ctx)?,
        });
        files.insert(TREE_FILE.to_string(), to_pretty(&dump, TREE_FILE)?);

        let mut artifact = ArtifactManifest::new(ArtifactType::CdkTree);
        artifact.properties = Some(json!({ "file": TREE_FILE }));
        manifest.artifacts.insert(TREE_ARTIFACT_ID.to_string(), artifact);
    }

    manifest.missing = tree.missing().cloned().collect();
    assembly::validate(&manifest)?;

    debug!(
        artifacts = manifest.artifacts.len(),
        files = files.len(),
        assets = assets.len(),
        "assembly rendered"
    );
    Ok(Assembly {
        manifest,
        files,
        assets,
    })
}

/// Write a rendered assembly into `outdir`.
///
/// Any existing `manifest.json` is removed before the first write and the
/// new one is written last.
pub fn write_assembly(assembly: &Assembly, outdir: &Path) -> Result<(), SynthError> {
    let paths = AssemblyPaths::new(outdir);
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SynthError::Io { path, source }
    };

    fs::create_dir_all(outdir).map_err(io_error(outdir))?;
    let manifest_path = paths.manifest();
    if manifest_path.exists() {
        fs::remove_file(&manifest_path).map_err(io_error(&manifest_path))?;
    }

    for (name, contents) in &assembly.files {
        let path = paths.file(name);
        write_atomic(&path, contents).map_err(io_error(&path))?;
    }
    for (name, source) in &assembly.assets {
        let path = paths.file(name);
        fs::copy(source, &path).map_err(io_error(&path))?;
    }

    assembly::save(&assembly.manifest, &manifest_path)?;
    Ok(())
}

/// Manifest metadata of one unit, keyed by `/`-prefixed node path.
///
/// Covers the unit and every node below it except nested stacks, which
/// report in their own artifact.
pub fn unit_metadata(tree: &Tree, unit: NodeIdx) -> Value {
    let mut out = Map::new();
    let mut pending = vec![unit];

    while let Some(idx) = pending.pop() {
        let mut entries: Vec<Value> = tree.metadata(idx).iter().map(entry_value).collect();

        if let NodeKind::Resource(_) = tree.kind(idx) {
            if let Some(logical_id) = tree.logical_id(idx) {
                entries.push(json!({ "type": LOGICAL_ID, "data": logical_id }));
            }
        }
        if idx == unit {
            if let Some(data) = tree.stack(unit).filter(|d| !d.tags().is_empty()) {
                let tags: Vec<Value> = data
                    .tags()
                    .iter()
                    .map(|(k, v)| json!({ "Key": k, "Value": v }))
                    .collect();
                entries.push(json!({ "type": STACK_TAGS, "data": tags }));
            }
        }

        if !entries.is_empty() {
            out.insert(format!("/{}", tree.path(idx)), Value::Array(entries));
        }

        for child in tree.children(idx).iter().rev() {
            if tree.stack(*child).is_none() {
                pending.push(*child);
            }
        }
    }
    Value::Object(out)
}

fn entry_value(entry: &MetadataEntry) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), json!(entry.entry_type));
    if let Some(data) = &entry.data {
        out.insert("data".into(), data.clone());
    }
    if let Some(trace) = &entry.trace {
        out.insert("trace".into(), json!(trace));
    }
    Value::Object(out)
}

fn stack_properties(data: &StackData) -> StackProperties {
    let template_file = data.template_file();
    if data.is_nested() {
        return StackProperties {
            template_file,
            ..StackProperties::default()
        };
    }
    StackProperties {
        template_file,
        stack_name: Some(data.stack_name().to_string()),
        parameters: data.parameter_values().clone(),
        tags: data.tags().clone(),
        termination_protection: data.termination_protection().then_some(true),
        requires_bootstrap_stack_version: Some(REQUIRED_BOOTSTRAP_VERSION),
    }
}

fn asset_manifest(
    data: &StackData,
) -> Result<(String, ArtifactManifest, String, Vec<u8>), SynthError> {
    let files: Map<String, Value> = data
        .assets()
        .iter()
        .map(|a| (a.hash.clone(), a.manifest_entry()))
        .collect();
    let document = json!({
        "version": ASSEMBLY_VERSION.to_string(),
        "files": files,
    });

    let file = data.asset_manifest_file();
    let contents = to_pretty(&document, &file)?;

    let mut artifact = ArtifactManifest::new(ArtifactType::AssetManifest);
    artifact.properties = Some(json!({ "file": file }));
    Ok((data.asset_manifest_id(), artifact, file, contents))
}

fn dump_node(tree: &Tree, idx: NodeIdx, ctx: &ResolveContext<'_>) -> Result<Value, SynthError> {
    let mut node = Map::new();
    let id = if idx == tree.root() {
        ROOT_DISPLAY_ID
    } else {
        tree.id(idx)
    };
    node.insert("id".into(), json!(id));
    node.insert("path".into(), json!(tree.path(idx)));

    if let Some(resource) = tree.resource(idx) {
        let props = resolve(&Value::Object(resource.properties().clone()), &ctx.with_scope(idx))?;
        node.insert(
            "attributes".into(),
            json!({
                "aws:cdk:cloudformation:type": resource.resource_type(),
                "aws:cdk:cloudformation:props": props,
            }),
        );
    }

    let mut children = Map::new();
    for child in tree.children(idx) {
        children.insert(tree.id(*child).to_string(), dump_node(tree, *child, ctx)?);
    }
    if !children.is_empty() {
        node.insert("children".into(), Value::Object(children));
    }
    Ok(Value::Object(node))
}

fn to_pretty(value: &Value, what: &str) -> Result<Vec<u8>, SynthError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|source| SynthError::Serialize {
        what: what.to_string(),
        source,
    })?;
    text.push('\n');
    Ok(text.into_bytes())
}

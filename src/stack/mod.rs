//! stack
//!
//! Deployment units and the resources they hold.
//!
//! # Modules
//!
//! - [`resource`] - Resources: typed property bags with a logical id
//! - [`template`] - Rendering of a unit's template document
//! - [`asset`] - Content-addressed file assets
//!
//! # Model
//!
//! A [`Stack`] is a handle to a tree node of kind `Stack`; a [`Resource`]
//! is a handle to a node of kind `Resource`. Handles are `Copy` and every
//! operation takes the tree explicitly. A stack created below another stack
//! is nested: it shares its parent's environment and is rendered in the
//! parent template as a nested-stack resource.
//!
//! Outputs, parameters and dependencies that synthesis derives from
//! cross-unit references are kept apart from the user's own, and are
//! recomputed on every synthesis run.

pub mod asset;
pub mod resource;
pub mod template;

pub use asset::FileAsset;
pub use resource::{RemovalPolicy, Resource, ResourceData};
pub use template::{render_template, TemplateFragment};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;

use serde_json::{json, Value};

use crate::construct::metadata;
use crate::construct::{NodeIdx, NodeKind, StructuralError, Tree};
use crate::core::naming::make_unique_id;
use crate::core::types::{ConstructId, Environment, LogicalId, StackName};

/// Resource type of a nested stack in its parent's template.
pub const NESTED_STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

/// Bootstrap stack version required to deploy a top-level stack.
pub const REQUIRED_BOOTSTRAP_VERSION: u64 = 6;

/// Options for creating a stack.
#[derive(Debug, Clone, Default)]
pub struct StackProps {
    /// Deployed name. Defaults to the artifact id.
    pub stack_name: Option<String>,
    /// Target environment. Defaults to agnostic, or the parent's for
    /// nested stacks.
    pub env: Option<Environment>,
    pub description: Option<String>,
    pub termination_protection: bool,
    pub tags: BTreeMap<String, String>,
}

/// A template output.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub value: Value,
    pub description: Option<String>,
    pub export_name: Option<String>,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            description: None,
            export_name: None,
        }
    }

    pub(crate) fn render(&self) -> Value {
        let mut out = json!({ "Value": self.value });
        if let Some(description) = &self.description {
            out["Description"] = json!(description);
        }
        if let Some(export) = &self.export_name {
            out["Export"] = json!({ "Name": export });
        }
        out
    }
}

/// A template parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub param_type: String,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub no_echo: bool,
}

impl Parameter {
    pub fn new(param_type: impl Into<String>) -> Self {
        Self {
            param_type: param_type.into(),
            default: None,
            description: None,
            no_echo: false,
        }
    }

    pub(crate) fn render(&self) -> Value {
        let mut out = json!({ "Type": self.param_type });
        if let Some(default) = &self.default {
            out["Default"] = default.clone();
        }
        if let Some(description) = &self.description {
            out["Description"] = json!(description);
        }
        if self.no_echo {
            out["NoEcho"] = json!(true);
        }
        out
    }
}

/// State synthesis derives for a unit; cleared before each run.
#[derive(Debug, Clone, Default)]
pub struct DerivedState {
    pub outputs: BTreeMap<String, Output>,
    pub parameters: BTreeMap<String, Parameter>,
    /// Values the parent template passes to this nested stack's parameters.
    pub nested_parameters: BTreeMap<String, Value>,
    /// Export names this unit publishes.
    pub exports: BTreeSet<String>,
    /// Import name to import token id.
    pub imports: BTreeMap<String, crate::token::TokenId>,
    /// Element to elements it must wait for, both rendered in this unit.
    pub depends_on: BTreeMap<NodeIdx, BTreeSet<NodeIdx>>,
    /// Top-level units this one must deploy after.
    pub unit_dependencies: BTreeSet<NodeIdx>,
}

/// Data held by a stack node.
#[derive(Debug, Clone)]
pub struct StackData {
    artifact_id: String,
    stack_name: StackName,
    environment: Environment,
    nested: bool,
    description: Option<String>,
    termination_protection: bool,
    tags: BTreeMap<String, String>,
    transforms: Vec<String>,
    parameter_values: BTreeMap<String, String>,
    outputs: BTreeMap<String, Output>,
    parameters: BTreeMap<String, Parameter>,
    assets: Vec<FileAsset>,
    pub(crate) derived: DerivedState,
}

impl StackData {
    pub fn artifact_id(&self) -> &str {
        &self.artifact_id
    }

    pub fn stack_name(&self) -> &StackName {
        &self.stack_name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn termination_protection(&self) -> bool {
        self.termination_protection
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn transforms(&self) -> &[String] {
        &self.transforms
    }

    /// Deploy-time values for the stack's own parameters.
    pub fn parameter_values(&self) -> &BTreeMap<String, String> {
        &self.parameter_values
    }

    pub fn assets(&self) -> &[FileAsset] {
        &self.assets
    }

    pub fn derived(&self) -> &DerivedState {
        &self.derived
    }

    /// User outputs followed by derived ones.
    pub fn all_outputs(&self) -> impl Iterator<Item = (&String, &Output)> {
        self.outputs.iter().chain(self.derived.outputs.iter())
    }

    /// User parameters followed by derived ones.
    pub fn all_parameters(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.parameters.iter().chain(self.derived.parameters.iter())
    }

    /// Name of the template file within the assembly.
    pub fn template_file(&self) -> String {
        if self.nested {
            format!("{}.nested.template.json", self.artifact_id)
        } else {
            format!("{}.template.json", self.artifact_id)
        }
    }

    /// Name of the asset manifest within the assembly.
    pub fn asset_manifest_file(&self) -> String {
        format!("{}.assets.json", self.artifact_id)
    }

    /// Artifact id of the asset manifest.
    pub fn asset_manifest_id(&self) -> String {
        format!("{}.assets", self.artifact_id)
    }

    fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name) || self.derived.outputs.contains_key(name)
    }

    fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name) || self.derived.parameters.contains_key(name)
    }

    /// Add a derived output unless one with the name already exists.
    pub(crate) fn add_derived_output(&mut self, name: &str, output: Output) {
        if !self.has_output(name) {
            if let Some(export) = &output.export_name {
                self.derived.exports.insert(export.clone());
            }
            self.derived.outputs.insert(name.to_string(), output);
        }
    }

    /// Add a derived parameter unless one with the name already exists.
    pub(crate) fn add_derived_parameter(&mut self, name: &str, parameter: Parameter) {
        if !self.has_parameter(name) {
            self.derived.parameters.insert(name.to_string(), parameter);
        }
    }
}

/// Handle to a deployment unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stack(NodeIdx);

impl Stack {
    /// Create a stack under `scope`.
    ///
    /// A stack with a stack ancestor is nested and inherits its
    /// environment.
    ///
    /// # Errors
    ///
    /// - The structural errors of [`Tree::add_child`]
    /// - `Invalid` for an invalid stack name
    /// - `EnvironmentMismatch` when a nested stack asks for an environment
    ///   that concretely differs from its parent's
    pub fn new(
        tree: &mut Tree,
        scope: NodeIdx,
        id: &str,
        props: StackProps,
    ) -> Result<Stack, StructuralError> {
        let escaped = ConstructId::new(id)?;
        let (path, artifact_id) = {
            let mut components = tree.path_components(scope);
            components.push(escaped.as_str());
            (components.join("/"), make_unique_id(&components))
        };

        let parent_env = tree
            .unit_of(scope)
            .and_then(|u| tree.stack(u))
            .map(|s| s.environment().clone());
        let nested = parent_env.is_some();

        let environment = match (parent_env, props.env) {
            (Some(parent), Some(own)) if parent.concretely_differs(&own) => {
                return Err(StructuralError::EnvironmentMismatch { path });
            }
            (Some(parent), _) => parent,
            (None, Some(own)) => own,
            (None, None) => Environment::default(),
        };

        let stack_name = match props.stack_name {
            Some(name) => StackName::new(name)?,
            None => StackName::new(artifact_id.clone())?,
        };

        let data = StackData {
            artifact_id,
            stack_name,
            environment,
            nested,
            description: props.description,
            termination_protection: props.termination_protection,
            tags: props.tags,
            transforms: Vec::new(),
            parameter_values: BTreeMap::new(),
            outputs: BTreeMap::new(),
            parameters: BTreeMap::new(),
            assets: Vec::new(),
            derived: DerivedState::default(),
        };

        let idx = tree.add_node(scope, id, NodeKind::Stack(Box::new(data)))?;
        Ok(Stack(idx))
    }

    /// The stack at `idx`, if that node is one.
    pub fn from_node(tree: &Tree, idx: NodeIdx) -> Option<Stack> {
        tree.stack(idx).map(|_| Stack(idx))
    }

    /// The nearest enclosing stack of any node.
    pub fn of(tree: &Tree, idx: NodeIdx) -> Option<Stack> {
        tree.unit_of(idx).map(Stack)
    }

    pub fn node(self) -> NodeIdx {
        self.0
    }

    /// Stack data.
    ///
    /// # Panics
    ///
    /// If the handle belongs to another tree.
    pub fn data(self, tree: &Tree) -> &StackData {
        match tree.kind(self.0) {
            NodeKind::Stack(data) => data,
            other => panic!("node {} is a {}, not a stack", self.0, other.name()),
        }
    }

    fn data_mut(self, tree: &mut Tree) -> Result<&mut StackData, StructuralError> {
        let path = tree.path(self.0);
        tree.stack_mut(self.0).ok_or(StructuralError::WrongKind {
            path,
            expected: "stack",
        })
    }

    pub fn artifact_id(self, tree: &Tree) -> &str {
        self.data(tree).artifact_id()
    }

    pub fn is_nested(self, tree: &Tree) -> bool {
        self.data(tree).is_nested()
    }

    /// Add a template output.
    ///
    /// # Errors
    ///
    /// `Invalid` for a non-alphanumeric name, `DuplicateElement` for a
    /// name already in use.
    pub fn add_output(
        self,
        tree: &mut Tree,
        name: &str,
        output: Output,
    ) -> Result<(), StructuralError> {
        let name = LogicalId::new(name)?;
        let stack = tree.path(self.0);
        let data = self.data_mut(tree)?;
        if data.has_output(name.as_str()) {
            return Err(StructuralError::DuplicateElement {
                stack,
                what: "output",
                name: name.to_string(),
            });
        }
        data.outputs.insert(name.to_string(), output);
        Ok(())
    }

    /// Add a template parameter and return an intrinsic referring to it.
    ///
    /// # Errors
    ///
    /// `Invalid` for a non-alphanumeric name, `DuplicateElement` for a
    /// name already in use.
    pub fn add_parameter(
        self,
        tree: &mut Tree,
        name: &str,
        parameter: Parameter,
    ) -> Result<Value, StructuralError> {
        let name = LogicalId::new(name)?;
        let stack = tree.path(self.0);
        let data = self.data_mut(tree)?;
        if data.has_parameter(name.as_str()) {
            return Err(StructuralError::DuplicateElement {
                stack,
                what: "parameter",
                name: name.to_string(),
            });
        }
        data.parameters.insert(name.to_string(), parameter);
        Ok(json!({ "Ref": name.as_str() }))
    }

    /// Set the deploy-time value of one of the stack's parameters.
    pub fn set_parameter_value(
        self,
        tree: &mut Tree,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StructuralError> {
        self.data_mut(tree)?
            .parameter_values
            .insert(name.into(), value.into());
        Ok(())
    }

    pub fn add_tag(
        self,
        tree: &mut Tree,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StructuralError> {
        self.data_mut(tree)?.tags.insert(key.into(), value.into());
        Ok(())
    }

    /// Add a template transform (macro), keeping first-added order.
    pub fn add_transform(self, tree: &mut Tree, name: impl Into<String>) -> Result<(), StructuralError> {
        let name = name.into();
        let data = self.data_mut(tree)?;
        if !data.transforms.contains(&name) {
            data.transforms.push(name);
        }
        Ok(())
    }

    /// Register a file to ship with the assembly.
    ///
    /// The file is hashed now and copied at emit time.
    ///
    /// # Errors
    ///
    /// `AssetSource` when the file cannot be read.
    #[track_caller]
    pub fn add_file_asset(self, tree: &mut Tree, path: &Path) -> Result<FileAsset, StructuralError> {
        let asset = FileAsset::from_path(path)?;
        let data = self.data_mut(tree)?;
        if !data.assets.iter().any(|a| a.hash == asset.hash) {
            data.assets.push(asset.clone());
        }
        tree.add_metadata(self.0, metadata::ASSET, asset.metadata());
        Ok(asset)
    }

    /// Deploy this stack only after `other`.
    pub fn add_dependency(self, tree: &mut Tree, other: Stack) -> Result<(), StructuralError> {
        tree.add_dependency(self.0, other.0)
    }

    /// Attach a custom template fragment below this stack.
    pub fn add_fragment(
        self,
        tree: &mut Tree,
        id: &str,
        fragment: Rc<dyn TemplateFragment>,
    ) -> Result<NodeIdx, StructuralError> {
        tree.add_node(self.0, id, NodeKind::Fragment(fragment))
    }
}

//! stack::resource
//!
//! Resources: typed property bags rendered into their unit's template.

use serde_json::{json, Map, Value};

use crate::construct::{NodeIdx, NodeKind, StructuralError, Tree};
use crate::core::types::LogicalId;
use crate::reference::RefAttribute;
use crate::token::ValueDomain;

/// What happens to a resource when it leaves the template or is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalPolicy {
    Delete,
    Retain,
    Snapshot,
}

impl RemovalPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RemovalPolicy::Delete => "Delete",
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Snapshot => "Snapshot",
        }
    }
}

/// Data held by a resource node.
#[derive(Debug, Clone)]
pub struct ResourceData {
    resource_type: String,
    properties: Map<String, Value>,
    logical_id_override: Option<LogicalId>,
    condition: Option<String>,
    deletion_policy: Option<RemovalPolicy>,
    update_replace_policy: Option<RemovalPolicy>,
    metadata: Map<String, Value>,
}

impl ResourceData {
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn logical_id_override(&self) -> Option<&str> {
        self.logical_id_override.as_ref().map(LogicalId::as_str)
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn deletion_policy(&self) -> Option<RemovalPolicy> {
        self.deletion_policy
    }

    pub fn update_replace_policy(&self) -> Option<RemovalPolicy> {
        self.update_replace_policy
    }

    /// Resource-level template metadata.
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Handle to a resource.
///
/// # Example
///
/// ```
/// use cxsynth::construct::Tree;
/// use cxsynth::stack::{Resource, Stack, StackProps};
/// use serde_json::json;
///
/// let mut tree = Tree::new();
/// let root = tree.root();
/// let stack = Stack::new(&mut tree, root, "App", StackProps::default()).unwrap();
/// let bucket = Resource::new(&mut tree, stack.node(), "Bucket", "AWS::S3::Bucket", json!({})).unwrap();
///
/// assert_eq!(tree.logical_id(bucket.node()).unwrap(), "Bucket");
/// assert!(bucket.get_att(&tree, "Arn").starts_with("${Token[Arn."));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource(NodeIdx);

impl Resource {
    /// Create a resource under `scope`, which must lie inside a stack.
    ///
    /// `properties` must be an object or null.
    pub fn new(
        tree: &mut Tree,
        scope: NodeIdx,
        id: &str,
        resource_type: &str,
        properties: Value,
    ) -> Result<Resource, StructuralError> {
        if tree.unit_of(scope).is_none() {
            return Err(StructuralError::WrongKind {
                path: tree.path(scope),
                expected: "stack or descendant of a stack",
            });
        }
        let properties = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(StructuralError::WrongKind {
                    path: tree.path(scope),
                    expected: "property object",
                })
            }
        };
        let data = ResourceData {
            resource_type: resource_type.to_string(),
            properties,
            logical_id_override: None,
            condition: None,
            deletion_policy: None,
            update_replace_policy: None,
            metadata: Map::new(),
        };
        let idx = tree.add_node(scope, id, NodeKind::Resource(Box::new(data)))?;
        Ok(Resource(idx))
    }

    /// The resource at `idx`, if that node is one.
    pub fn from_node(tree: &Tree, idx: NodeIdx) -> Option<Resource> {
        tree.resource(idx).map(|_| Resource(idx))
    }

    pub fn node(self) -> NodeIdx {
        self.0
    }

    fn data_mut(self, tree: &mut Tree) -> Result<&mut ResourceData, StructuralError> {
        let path = tree.path(self.0);
        tree.resource_mut(self.0).ok_or(StructuralError::WrongKind {
            path,
            expected: "resource",
        })
    }

    /// String token for `{"Ref": logicalId}`.
    pub fn ref_(self, tree: &Tree) -> String {
        tree.tokens()
            .reference(self.0, RefAttribute::Ref, ValueDomain::String)
            .as_string()
    }

    /// String token for `{"Fn::GetAtt": [logicalId, attribute]}`.
    pub fn get_att(self, tree: &Tree, attribute: &str) -> String {
        tree.tokens()
            .reference(
                self.0,
                RefAttribute::GetAtt(attribute.to_string()),
                ValueDomain::String,
            )
            .as_string()
    }

    /// List token for a list-valued attribute.
    pub fn get_att_list(self, tree: &Tree, attribute: &str) -> Vec<String> {
        tree.tokens()
            .reference(
                self.0,
                RefAttribute::GetAtt(attribute.to_string()),
                ValueDomain::List,
            )
            .as_list()
    }

    /// Replace the derived logical id.
    pub fn override_logical_id(self, tree: &mut Tree, id: &str) -> Result<(), StructuralError> {
        let id = LogicalId::new(id)?;
        self.data_mut(tree)?.logical_id_override = Some(id);
        Ok(())
    }

    pub fn set_property(
        self,
        tree: &mut Tree,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), StructuralError> {
        self.data_mut(tree)?.properties.insert(key.into(), value);
        Ok(())
    }

    pub fn set_condition(self, tree: &mut Tree, condition: impl Into<String>) -> Result<(), StructuralError> {
        self.data_mut(tree)?.condition = Some(condition.into());
        Ok(())
    }

    /// Set both the deletion and the update-replace policy.
    pub fn apply_removal_policy(self, tree: &mut Tree, policy: RemovalPolicy) -> Result<(), StructuralError> {
        let data = self.data_mut(tree)?;
        data.deletion_policy = Some(policy);
        data.update_replace_policy = Some(policy);
        Ok(())
    }

    /// Add a resource-level template metadata key.
    pub fn add_template_metadata(
        self,
        tree: &mut Tree,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), StructuralError> {
        self.data_mut(tree)?.metadata.insert(key.into(), value);
        Ok(())
    }

    /// Deploy this resource only after `other`.
    pub fn add_depends_on(self, tree: &mut Tree, other: Resource) -> Result<(), StructuralError> {
        tree.add_dependency(self.0, other.0)
    }
}

/// Render a resource's template entry, without `DependsOn`.
pub(crate) fn render_resource(data: &ResourceData, path_metadata: Option<&str>) -> Value {
    let mut out = json!({ "Type": data.resource_type });
    if !data.properties.is_empty() {
        out["Properties"] = Value::Object(data.properties.clone());
    }
    if let Some(condition) = &data.condition {
        out["Condition"] = json!(condition);
    }
    if let Some(policy) = data.deletion_policy {
        out["DeletionPolicy"] = json!(policy.as_str());
    }
    if let Some(policy) = data.update_replace_policy {
        out["UpdateReplacePolicy"] = json!(policy.as_str());
    }

    let mut metadata = data.metadata.clone();
    if let Some(path) = path_metadata {
        metadata.insert(
            crate::construct::metadata::PATH_METADATA_KEY.to_string(),
            json!(path),
        );
    }
    if !metadata.is_empty() {
        out["Metadata"] = Value::Object(metadata);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{Stack, StackProps};

    fn setup() -> (Tree, Stack) {
        let mut tree = Tree::new();
        let root = tree.root();
        let stack = Stack::new(&mut tree, root, "App", StackProps::default()).unwrap();
        (tree, stack)
    }

    #[test]
    fn resource_requires_enclosing_stack() {
        let mut tree = Tree::new();
        let root = tree.root();
        assert!(matches!(
            Resource::new(&mut tree, root, "Bucket", "AWS::S3::Bucket", Value::Null),
            Err(StructuralError::WrongKind { .. })
        ));
    }

    #[test]
    fn logical_id_is_relative_to_unit() {
        let (mut tree, stack) = setup();
        let group = tree.add_child(stack.node(), "Storage").unwrap();
        let bucket = Resource::new(&mut tree, group, "Bucket", "AWS::S3::Bucket", json!({})).unwrap();
        let id = tree.logical_id(bucket.node()).unwrap();
        assert!(id.starts_with("StorageBucket"));
        assert!(!id.starts_with("App"));
    }

    #[test]
    fn override_wins_and_is_validated() {
        let (mut tree, stack) = setup();
        let bucket = Resource::new(&mut tree, stack.node(), "Bucket", "AWS::S3::Bucket", json!({})).unwrap();
        bucket.override_logical_id(&mut tree, "MyBucket").unwrap();
        assert_eq!(tree.logical_id(bucket.node()).unwrap(), "MyBucket");
        assert!(bucket.override_logical_id(&mut tree, "my-bucket").is_err());
    }

    #[test]
    fn same_attribute_yields_same_token() {
        let (mut tree, stack) = setup();
        let bucket = Resource::new(&mut tree, stack.node(), "Bucket", "AWS::S3::Bucket", json!({})).unwrap();
        assert_eq!(bucket.get_att(&tree, "Arn"), bucket.get_att(&tree, "Arn"));
        assert_ne!(bucket.get_att(&tree, "Arn"), bucket.ref_(&tree));
    }

    #[test]
    fn render_includes_options() {
        let (mut tree, stack) = setup();
        let bucket = Resource::new(
            &mut tree,
            stack.node(),
            "Bucket",
            "AWS::S3::Bucket",
            json!({"BucketName": "b"}),
        )
        .unwrap();
        bucket.set_condition(&mut tree, "IsProd").unwrap();
        bucket
            .apply_removal_policy(&mut tree, RemovalPolicy::Retain)
            .unwrap();

        let data = tree.resource(bucket.node()).unwrap();
        let rendered = render_resource(data, Some("App/Bucket"));
        assert_eq!(
            rendered,
            json!({
                "Type": "AWS::S3::Bucket",
                "Properties": {"BucketName": "b"},
                "Condition": "IsProd",
                "DeletionPolicy": "Retain",
                "UpdateReplacePolicy": "Retain",
                "Metadata": {"aws:cdk:path": "App/Bucket"}
            })
        );
    }

    #[test]
    fn empty_properties_are_omitted() {
        let (mut tree, stack) = setup();
        let topic = Resource::new(&mut tree, stack.node(), "Topic", "AWS::SNS::Topic", Value::Null).unwrap();
        let rendered = render_resource(tree.resource(topic.node()).unwrap(), None);
        assert_eq!(rendered, json!({"Type": "AWS::SNS::Topic"}));
    }
}

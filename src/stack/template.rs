//! stack::template
//!
//! Rendering of a deployment unit's template document.
//!
//! The rendered document still contains tokens; the synthesizer resolves
//! it. Elements of a unit are the resources, fragments and directly nested
//! stacks found below it without crossing into a nested stack.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use super::resource::render_resource;
use super::NESTED_STACK_RESOURCE_TYPE;
use crate::construct::metadata::PATH_METADATA_KEY;
use crate::construct::{NodeIdx, NodeKind, StructuralError, Tree};

/// Extension point for template content other than resources.
///
/// The returned object maps section names (`Conditions`, `Mappings`,
/// `Rules`, `Resources`, ...) to entries merged into the unit's template.
pub trait TemplateFragment {
    fn render(&self, tree: &Tree, node: NodeIdx) -> Value;
}

/// Options that change how templates are rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Add `aws:cdk:path` metadata to every resource.
    pub path_metadata: bool,
}

/// Elements rendered into `unit`'s template, in pre-order.
pub fn unit_elements(tree: &Tree, unit: NodeIdx) -> Vec<NodeIdx> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeIdx> = tree.children(unit).iter().rev().copied().collect();
    while let Some(idx) = stack.pop() {
        match tree.kind(idx) {
            NodeKind::Stack(_) => {
                out.push(idx);
                continue;
            }
            NodeKind::Resource(_) | NodeKind::Fragment(_) => out.push(idx),
            NodeKind::Root | NodeKind::Construct => {}
        }
        stack.extend(tree.children(idx).iter().rev().copied());
    }
    out
}

/// Render the unresolved template of `unit`.
///
/// # Errors
///
/// - `WrongKind` if `unit` is not a stack
/// - `DuplicateLogicalId` when two elements share a logical id
/// - `DuplicateElement` when fragments collide in another section
pub fn render_template(
    tree: &Tree,
    unit: NodeIdx,
    options: RenderOptions,
) -> Result<Value, StructuralError> {
    let stack_path = tree.path(unit);
    let data = tree.stack(unit).ok_or_else(|| StructuralError::WrongKind {
        path: stack_path.clone(),
        expected: "stack",
    })?;

    let mut sections: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    let mut insert = |section: &str, key: String, value: Value| -> Result<(), StructuralError> {
        let entries = sections.entry(section.to_string()).or_default();
        if entries.contains_key(&key) {
            return Err(if section == "Resources" {
                StructuralError::DuplicateLogicalId {
                    stack: stack_path.clone(),
                    logical_id: key,
                }
            } else {
                StructuralError::DuplicateElement {
                    stack: stack_path.clone(),
                    what: "template entry",
                    name: format!("{section}.{key}"),
                }
            });
        }
        entries.insert(key, value);
        Ok(())
    };

    for (name, parameter) in data.all_parameters() {
        insert("Parameters", name.clone(), parameter.render())?;
    }

    for element in unit_elements(tree, unit) {
        let path = tree.path(element);
        let path_metadata = options.path_metadata.then_some(path.as_str());

        let mut rendered = match tree.kind(element) {
            NodeKind::Resource(resource) => render_resource(resource, path_metadata),
            NodeKind::Stack(nested) => {
                let mut properties = json!({ "TemplateURL": nested.template_file() });
                if !nested.derived.nested_parameters.is_empty() {
                    properties["Parameters"] = json!(nested.derived.nested_parameters);
                }
                let mut out = json!({
                    "Type": NESTED_STACK_RESOURCE_TYPE,
                    "Properties": properties,
                });
                if let Some(path) = path_metadata {
                    let mut metadata = Map::new();
                    metadata.insert(PATH_METADATA_KEY.to_string(), json!(path));
                    out["Metadata"] = Value::Object(metadata);
                }
                out
            }
            NodeKind::Fragment(fragment) => {
                if let Value::Object(parts) = fragment.render(tree, element) {
                    for (section, entries) in parts {
                        if let Value::Object(entries) = entries {
                            for (key, value) in entries {
                                insert(&section, key, value)?;
                            }
                        }
                    }
                }
                continue;
            }
            NodeKind::Root | NodeKind::Construct => continue,
        };

        if let Some(deps) = data.derived.depends_on.get(&element) {
            let mut ids: Vec<String> = deps.iter().filter_map(|d| tree.logical_id(*d)).collect();
            ids.sort();
            ids.dedup();
            if !ids.is_empty() {
                rendered["DependsOn"] = json!(ids);
            }
        }

        let Some(logical_id) = tree.logical_id(element) else {
            continue;
        };
        insert("Resources", logical_id, rendered)?;
    }

    for (name, output) in data.all_outputs() {
        insert("Outputs", name.clone(), output.render())?;
    }

    let mut template = Map::new();
    if let Some(description) = data.description() {
        template.insert("Description".into(), json!(description));
    }
    match data.transforms() {
        [] => {}
        [single] => {
            template.insert("Transform".into(), json!(single));
        }
        many => {
            template.insert("Transform".into(), json!(many));
        }
    }
    for (section, entries) in sections {
        if !entries.is_empty() {
            template.insert(section, Value::Object(entries));
        }
    }
    Ok(Value::Object(template))
}

//! assembly::adapters
//!
//! In-memory upgrades of manifests written with an older major version.
//!
//! Adapters run on the raw JSON before typed parsing, oldest first. Each
//! entry upgrades a manifest from the named major to the next one.
//!
//! | From | Change |
//! |------|--------|
//! | 1 | Artifact types were colon-spelled (`aws:cloudformation:stack`) |
//! | 2 | `missing` was an object keyed by context key |
//! | 3 | None; 4 added the optional `displayName` |

use serde_json::{Map, Value};

use super::schema::ASSEMBLY_VERSION;

type Adapter = fn(&mut Map<String, Value>);

const ADAPTERS: &[(u64, Adapter)] = &[(1, colon_artifact_types), (2, missing_as_list)];

/// Upgrade a raw manifest of major `from` to the current format.
///
/// The result carries [`ASSEMBLY_VERSION`] when any upgrade was needed.
pub fn upgrade(mut manifest: Map<String, Value>, from: u64) -> Map<String, Value> {
    if from >= ASSEMBLY_VERSION.major {
        return manifest;
    }
    for (major, adapter) in ADAPTERS {
        if from <= *major {
            adapter(&mut manifest);
        }
    }
    manifest.insert(
        "version".to_string(),
        Value::String(ASSEMBLY_VERSION.to_string()),
    );
    manifest
}

fn colon_artifact_types(manifest: &mut Map<String, Value>) {
    let Some(Value::Object(artifacts)) = manifest.get_mut("artifacts") else {
        return;
    };
    for artifact in artifacts.values_mut() {
        let Some(Value::String(kind)) = artifact.get_mut("type") else {
            continue;
        };
        let upgraded = match kind.as_str() {
            "aws:cloudformation:stack" => "aws-cloudformation-stack",
            "aws:cloudformation:nested-stack" => "nested-cloudformation-stack",
            "cdk:tree" => "cdk-tree",
            "cdk:asset-manifest" => "asset-manifest",
            _ => continue,
        };
        *kind = upgraded.to_string();
    }
}

fn missing_as_list(manifest: &mut Map<String, Value>) {
    let Some(Value::Object(missing)) = manifest.remove("missing") else {
        return;
    };
    let list: Vec<Value> = missing
        .into_iter()
        .map(|(key, entry)| {
            let mut item = Map::new();
            item.insert("key".to_string(), Value::String(key));
            if let Value::Object(fields) = entry {
                item.extend(fields);
            }
            Value::Object(item)
        })
        .collect();
    manifest.insert("missing".to_string(), Value::Array(list));
}

//! construct::context
//!
//! Missing-context protocol for context providers.
//!
//! A provider lookup is keyed by the provider name and its properties. When
//! the key is present in the tree's context the stored value is returned.
//! Otherwise the lookup is reported as missing, so the caller of synthesis
//! can fetch it and run again, and the caller's dummy value stands in.

use serde_json::{Map, Value};
use tracing::debug;

use super::tree::{NodeIdx, Tree};
use crate::assembly::schema::MissingContext;

/// Deterministic context key for a provider query.
///
/// Properties are appended as `:name=value` in key order.
///
/// # Example
///
/// ```
/// use cxsynth::construct::context::context_key;
/// use serde_json::json;
///
/// let props = json!({"region": "us-east-1", "account": "123456789012"});
/// let key = context_key("availability-zones", props.as_object().unwrap());
/// assert_eq!(key, "availability-zones:account=123456789012:region=us-east-1");
/// ```
pub fn context_key(provider: &str, props: &Map<String, Value>) -> String {
    let mut key = provider.to_string();
    let mut names: Vec<&String> = props.keys().collect();
    names.sort();
    for name in names {
        key.push(':');
        key.push_str(name);
        key.push('=');
        match &props[name.as_str()] {
            Value::String(s) => key.push_str(s),
            other => key.push_str(&other.to_string()),
        }
    }
    key
}

/// Look up a provider value, recording it as missing when absent.
///
/// The enclosing deployment unit's concrete account and region are added
/// to the properties unless the caller supplied them.
pub fn lookup(
    tree: &mut Tree,
    scope: NodeIdx,
    provider: &str,
    mut props: Map<String, Value>,
    dummy: Value,
) -> Value {
    if let Some(env) = tree.unit_of(scope).and_then(|u| tree.stack(u)).map(|s| s.environment().clone()) {
        if let Some(account) = env.account.as_concrete() {
            props
                .entry("account")
                .or_insert_with(|| Value::String(account.to_string()));
        }
        if let Some(region) = env.region.as_concrete() {
            props
                .entry("region")
                .or_insert_with(|| Value::String(region.to_string()));
        }
    }

    let key = context_key(provider, &props);
    if let Some(value) = tree.try_get_context(scope, &key) {
        return value.clone();
    }

    debug!(%key, "context value missing");
    tree.report_missing(MissingContext {
        key,
        provider: provider.to_string(),
        props: Value::Object(props),
    });
    dummy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn missing_value_is_reported_once_and_dummy_returned() {
        let mut tree = Tree::new();
        let n = tree.add_child(tree.root(), "N").unwrap();

        let v = lookup(&mut tree, n, "ami", props(json!({"name": "x"})), json!("dummy"));
        assert_eq!(v, json!("dummy"));
        lookup(&mut tree, n, "ami", props(json!({"name": "x"})), json!("dummy"));

        let missing: Vec<_> = tree.missing().collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].key, "ami:name=x");
        assert_eq!(missing[0].provider, "ami");
    }

    #[test]
    fn present_value_is_returned() {
        let mut tree = Tree::new();
        tree.set_context(tree.root(), "ami:name=x", json!("ami-123"))
            .unwrap();
        let n = tree.add_child(tree.root(), "N").unwrap();
        let v = lookup(&mut tree, n, "ami", props(json!({"name": "x"})), json!("dummy"));
        assert_eq!(v, json!("ami-123"));
        assert_eq!(tree.missing().count(), 0);
    }

    #[test]
    fn non_string_props_are_rendered_as_json() {
        let key = context_key("p", &props(json!({"n": 3, "flag": true})));
        assert_eq!(key, "p:flag=true:n=3");
    }
}

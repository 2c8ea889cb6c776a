//! token::concat
//!
//! Joining of resolved string fragments.
//!
//! A string with surrounding text around its tokens resolves to a list of
//! parts. [`StringConcat`] coerces every part to text. [`IntrinsicConcat`]
//! keeps non-string parts intact and emits an `Fn::Join` intrinsic for the
//! deployer to evaluate, which is what template emission uses.

use serde_json::{json, Value};

use super::resolve::ResolveError;

/// Strategy for joining resolved fragments.
pub trait FragmentConcat {
    fn join(&self, parts: Vec<Value>) -> Result<Value, ResolveError>;
}

/// Coerce every fragment to a string and concatenate.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringConcat;

impl FragmentConcat for StringConcat {
    fn join(&self, parts: Vec<Value>) -> Result<Value, ResolveError> {
        Ok(Value::String(parts.iter().map(stringify).collect()))
    }
}

/// Join scalars as text; wrap anything else in `Fn::Join`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntrinsicConcat;

impl FragmentConcat for IntrinsicConcat {
    fn join(&self, parts: Vec<Value>) -> Result<Value, ResolveError> {
        if parts.iter().all(is_scalar) {
            return StringConcat.join(parts);
        }

        let mut items: Vec<Value> = Vec::new();
        for part in parts {
            for piece in flatten_join(part) {
                if !is_scalar(&piece) {
                    items.push(piece);
                    continue;
                }
                let text = stringify(&piece);
                if let Some(Value::String(prev)) = items.last_mut() {
                    prev.push_str(&text);
                } else if !text.is_empty() {
                    items.push(Value::String(text));
                }
            }
        }

        Ok(json!({ "Fn::Join": ["", items] }))
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parts of an empty-delimiter `Fn::Join`, or the value itself.
fn flatten_join(value: Value) -> Vec<Value> {
    if let Value::Object(map) = &value {
        if map.len() == 1 {
            if let Some(Value::Array(args)) = map.get("Fn::Join") {
                if let [Value::String(delim), Value::Array(items)] = args.as_slice() {
                    if delim.is_empty() {
                        return items.clone();
                    }
                }
            }
        }
    }
    vec![value]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_concat_coerces() {
        let out = StringConcat
            .join(vec![json!("a"), json!(1), json!(true), json!(null), json!({"k": 1})])
            .unwrap();
        assert_eq!(out, json!("a1true{\"k\":1}"));
    }

    #[test]
    fn intrinsic_concat_keeps_scalars_as_string() {
        let out = IntrinsicConcat.join(vec![json!("a"), json!(2)]).unwrap();
        assert_eq!(out, json!("a2"));
    }

    #[test]
    fn intrinsic_concat_wraps_objects() {
        let out = IntrinsicConcat
            .join(vec![json!("arn:"), json!({"Ref": "X"}), json!("/"), json!("*")])
            .unwrap();
        assert_eq!(out, json!({"Fn::Join": ["", ["arn:", {"Ref": "X"}, "/*"]]}));
    }

    #[test]
    fn intrinsic_concat_flattens_nested_joins() {
        let nested = json!({"Fn::Join": ["", ["x", {"Ref": "A"}]]});
        let out = IntrinsicConcat
            .join(vec![json!("pre-"), nested, json!("-post")])
            .unwrap();
        assert_eq!(
            out,
            json!({"Fn::Join": ["", ["pre-x", {"Ref": "A"}, "-post"]]})
        );
    }

    #[test]
    fn intrinsic_concat_keeps_other_delimiters() {
        let joined = json!({"Fn::Join": [",", [{"Ref": "A"}, "b"]]});
        let out = IntrinsicConcat.join(vec![json!("x"), joined.clone()]).unwrap();
        assert_eq!(out, json!({"Fn::Join": ["", ["x", joined]]}));
    }
}

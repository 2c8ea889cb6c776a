//! token
//!
//! Lazy values: opaque handles for values computed during synthesis.
//!
//! # Modules
//!
//! - [`encoding`] - How handles are embedded in strings, numbers and lists
//! - [`registry`] - Allocation of handles and their producers
//! - [`resolve`] - Substitution of handles by their produced values
//! - [`concat`] - Joining of resolved string fragments
//!
//! # Model
//!
//! A token belongs to one [`ValueDomain`] and has one producer: a literal
//! fallback, a closure over the [`ResolveContext`], or a reference to an
//! attribute of a node in the tree. Producers are never invoked at
//! registration, only while resolving.
//!
//! # Example
//!
//! ```
//! use cxsynth::construct::Tree;
//! use cxsynth::token::{resolve, ResolveContext};
//! use serde_json::json;
//!
//! let tree = Tree::new();
//! let name = tree.tokens().string("Name", |_| Ok(json!("world")));
//!
//! let ctx = ResolveContext::new(&tree, tree.root());
//! let out = resolve(&json!({ "greeting": format!("hello {name}") }), &ctx).unwrap();
//! assert_eq!(out, json!({ "greeting": "hello world" }));
//! ```

pub mod concat;
pub mod encoding;
pub mod registry;
pub mod resolve;

pub use concat::{FragmentConcat, IntrinsicConcat, StringConcat};
pub use encoding::TokenId;
pub use registry::{ProducerFn, TokenEntry, TokenRegistry, TokenSource};
pub use resolve::{
    resolve, ResolveContext, ResolveError, ResolveOptions, ResolvePhase,
    DEFAULT_MAX_REDUCTIONS,
};

use serde_json::Value;

/// The kind of value a token stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueDomain {
    String,
    Number,
    List,
}

impl ValueDomain {
    /// Whether a fully resolved value is acceptable for this domain.
    ///
    /// Objects are accepted in every domain: they are template intrinsics
    /// evaluated by the deployer.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (_, Value::Object(_)) => true,
            (ValueDomain::String, Value::Array(_)) => false,
            (ValueDomain::String, _) => true,
            (ValueDomain::Number, Value::Number(_)) => true,
            (ValueDomain::List, Value::Array(_)) => true,
            _ => false,
        }
    }

    /// Lower-case name for messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueDomain::String => "string",
            ValueDomain::Number => "number",
            ValueDomain::List => "list",
        }
    }
}

impl std::fmt::Display for ValueDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed handle to a registered token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    id: TokenId,
    domain: ValueDomain,
    hint: String,
}

impl Token {
    pub(crate) fn new(id: TokenId, domain: ValueDomain, hint: String) -> Self {
        Self { id, domain, hint }
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn domain(&self) -> ValueDomain {
        self.domain
    }

    /// Display hint embedded in the sentinel.
    pub fn hint(&self) -> &str {
        &self.hint
    }

    /// The string sentinel for this token, usable in any string.
    pub fn as_string(&self) -> String {
        encoding::string_sentinel(&self.hint, self.id)
    }

    /// The reserved double standing for this token.
    pub fn as_number(&self) -> f64 {
        encoding::encode_number(self.id)
    }

    /// A one-element list standing for this token's list.
    pub fn as_list(&self) -> Vec<String> {
        vec![encoding::list_sentinel(&self.hint, self.id)]
    }

    /// The encoding matching the token's domain.
    pub fn to_value(&self) -> Value {
        match self.domain {
            ValueDomain::String => Value::String(self.as_string()),
            ValueDomain::Number => serde_json::Number::from_f64(self.as_number())
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueDomain::List => Value::from(self.as_list()),
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Whether the value contains any token anywhere.
///
/// # Example
///
/// ```
/// use cxsynth::token::is_unresolved;
/// use serde_json::json;
///
/// assert!(!is_unresolved(&json!({"a": [1, "b"]})));
/// assert!(is_unresolved(&json!({"a": ["x${Token[T.4]}"]})));
/// ```
pub fn is_unresolved(value: &Value) -> bool {
    match value {
        Value::String(s) => encoding::contains_sentinel(s),
        Value::Number(n) => n.is_f64() && n.as_f64().and_then(encoding::decode_number).is_some(),
        Value::Array(items) => items.iter().any(is_unresolved),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| encoding::contains_sentinel(k) || is_unresolved(v)),
        Value::Null | Value::Bool(_) => false,
    }
}

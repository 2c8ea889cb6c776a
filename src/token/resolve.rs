//! token::resolve
//!
//! Substitution of tokens by their produced values.
//!
//! # Algorithm
//!
//! 1. Primitives without sentinels are returned as-is
//! 2. Objects: keys and values are resolved separately; keys must reduce
//!    to strings
//! 3. Arrays: element-wise; an element that is exactly a list sentinel is
//!    spliced into the output when it reduces to an array
//! 4. Token handles invoke their producer and the result is resolved again
//! 5. Strings are split around sentinels. A string that is exactly one
//!    sentinel keeps the reduction's type; anything else is joined by the
//!    context's [`FragmentConcat`]
//! 6. Nested reductions are bounded by [`ResolveOptions::max_reductions`];
//!    exceeding the bound is reported as a cycle
//!
//! # Invariants
//!
//! - Resolving a value without tokens is the identity
//! - A resolved value contains no sentinels, so resolution is idempotent

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use super::concat::{FragmentConcat, StringConcat};
use super::encoding::{self, Fragment, TokenId};
use super::registry::TokenSource;
use crate::construct::{NodeIdx, Tree};
use crate::reference::{ReferenceError, ReferenceRecorder};

/// Default bound on nested token reductions.
pub const DEFAULT_MAX_REDUCTIONS: usize = 20;

static STRING_CONCAT: StringConcat = StringConcat;

/// Errors from resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("token cycle detected after {reductions} reductions involving tokens {}", format_ids(.tokens))]
    Cycle {
        tokens: Vec<TokenId>,
        reductions: usize,
    },

    #[error("unknown token {0}: sentinel does not belong to this tree")]
    UnknownToken(TokenId),

    #[error("producer of token {} failed: {message}", token_label(.token))]
    ProducerFailed {
        token: Option<TokenId>,
        message: String,
    },

    #[error("token {token} is a {expected} token but produced a {found}")]
    DomainMismatch {
        token: TokenId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("object key '{key}' resolved to a {found}, expected a string")]
    NonStringKey { key: String, found: &'static str },

    #[error("list token {token} embedded in a string: '{text}'")]
    ListTokenInString { token: TokenId, text: String },

    #[error("list token {token} resolved to an intrinsic and cannot share a list with other elements")]
    ListIntrinsicSpliced { token: TokenId },

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

impl ResolveError {
    /// Error for a producer to return when it cannot compute its value.
    pub fn failed(message: impl Into<String>) -> Self {
        ResolveError::ProducerFailed {
            token: None,
            message: message.into(),
        }
    }

    fn attach(self, id: TokenId) -> Self {
        match self {
            ResolveError::ProducerFailed {
                token: None,
                message,
            } => ResolveError::ProducerFailed {
                token: Some(id),
                message,
            },
            other => other,
        }
    }
}

fn format_ids(ids: &[TokenId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn token_label(token: &Option<TokenId>) -> String {
    token.map_or_else(|| "?".to_string(), |t| t.to_string())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Which pass is resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePhase {
    /// Reference-registration pass: references record themselves.
    Preparing,
    /// Emission pass: references produce their materialized values.
    Final,
}

/// Tunables for resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Maximum depth of nested token reductions.
    pub max_reductions: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_reductions: DEFAULT_MAX_REDUCTIONS,
        }
    }
}

/// Everything a producer can observe while it runs.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    /// The tree being synthesized.
    pub tree: &'a Tree,
    /// The node whose value is being resolved.
    pub scope: NodeIdx,
    /// Preparing or final.
    pub phase: ResolvePhase,
    /// Resolution tunables.
    pub options: ResolveOptions,
    concat: &'a dyn FragmentConcat,
    recorder: Option<&'a ReferenceRecorder>,
}

impl<'a> ResolveContext<'a> {
    /// A final-phase context with default options and string joining.
    pub fn new(tree: &'a Tree, scope: NodeIdx) -> Self {
        Self {
            tree,
            scope,
            phase: ResolvePhase::Final,
            options: ResolveOptions::default(),
            concat: &STRING_CONCAT,
            recorder: None,
        }
    }

    /// Switch to the preparing phase, recording references into `recorder`.
    pub fn preparing(mut self, recorder: &'a ReferenceRecorder) -> Self {
        self.phase = ResolvePhase::Preparing;
        self.recorder = Some(recorder);
        self
    }

    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_concat(mut self, concat: &'a dyn FragmentConcat) -> Self {
        self.concat = concat;
        self
    }

    /// Same context, different scope.
    pub fn with_scope(mut self, scope: NodeIdx) -> Self {
        self.scope = scope;
        self
    }

    /// Record that the current scope consumes the given reference token.
    pub(crate) fn record_reference(&self, token: TokenId) {
        if let Some(recorder) = self.recorder {
            recorder.record(self.scope, token);
        }
    }
}

/// Resolve every token in `value`.
///
/// # Errors
///
/// Fails on reduction cycles, unknown tokens, failing producers, domain
/// mismatches and reference errors.
pub fn resolve(value: &Value, ctx: &ResolveContext<'_>) -> Result<Value, ResolveError> {
    let mut resolver = Resolver {
        ctx,
        chain: Vec::new(),
    };
    resolver.value(value)
}

struct Resolver<'c, 'a> {
    ctx: &'c ResolveContext<'a>,
    chain: Vec<TokenId>,
}

impl Resolver<'_, '_> {
    fn value(&mut self, value: &Value) -> Result<Value, ResolveError> {
        match value {
            Value::String(s) => self.string(s),
            Value::Number(n) if n.is_f64() => {
                match n.as_f64().and_then(encoding::decode_number) {
                    Some(id) => self.token(id),
                    None => Ok(value.clone()),
                }
            }
            Value::Array(items) => self.array(items),
            Value::Object(map) => self.object(map),
            _ => Ok(value.clone()),
        }
    }

    fn object(&mut self, map: &Map<String, Value>) -> Result<Value, ResolveError> {
        let mut out = Map::new();
        for (key, value) in map {
            let key = self.key(key)?;
            let value = self.value(value)?;
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }

    fn key(&mut self, key: &str) -> Result<String, ResolveError> {
        if !encoding::contains_sentinel(key) {
            return Ok(key.to_string());
        }
        match self.string(key)? {
            Value::String(s) => Ok(s),
            other => Err(ResolveError::NonStringKey {
                key: key.to_string(),
                found: kind_name(&other),
            }),
        }
    }

    fn array(&mut self, items: &[Value]) -> Result<Value, ResolveError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let list_token = match item {
                Value::String(s) => encoding::single_list_token(s),
                _ => None,
            };
            let Some(id) = list_token else {
                out.push(self.value(item)?);
                continue;
            };
            match self.token(id)? {
                Value::Array(spliced) => out.extend(spliced),
                // An intrinsic yielding a list stands for the whole array.
                intrinsic if items.len() == 1 => return Ok(intrinsic),
                _ => return Err(ResolveError::ListIntrinsicSpliced { token: id }),
            }
        }
        Ok(Value::Array(out))
    }

    fn string(&mut self, s: &str) -> Result<Value, ResolveError> {
        if !encoding::contains_sentinel(s) {
            return Ok(Value::String(s.to_string()));
        }

        let fragments = encoding::split(s);
        if let [Fragment::Token(id)] | [Fragment::ListToken(id)] = fragments.as_slice() {
            return self.token(*id);
        }

        let mut parts = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            match fragment {
                Fragment::Literal(text) => parts.push(Value::String(text.to_string())),
                Fragment::Token(id) => parts.push(self.token(id)?),
                Fragment::ListToken(token) => {
                    return Err(ResolveError::ListTokenInString {
                        token,
                        text: s.to_string(),
                    })
                }
            }
        }

        self.ctx.concat.join(parts)
    }

    fn token(&mut self, id: TokenId) -> Result<Value, ResolveError> {
        let bound = self.ctx.options.max_reductions;
        if self.chain.len() >= bound {
            let mut tokens = Vec::new();
            for t in self.chain.iter().copied().chain(std::iter::once(id)) {
                if !tokens.contains(&t) {
                    tokens.push(t);
                }
            }
            return Err(ResolveError::Cycle {
                tokens,
                reductions: bound,
            });
        }

        let entry = self
            .ctx
            .tree
            .tokens()
            .lookup(id)
            .ok_or(ResolveError::UnknownToken(id))?;

        trace!(token = %id, hint = %entry.hint, depth = self.chain.len(), "reducing token");

        let produced = match &entry.source {
            TokenSource::Literal(value) => value.clone(),
            TokenSource::Lazy(producer) => (**producer)(self.ctx).map_err(|e| e.attach(id))?,
            TokenSource::Reference(reference) => reference.produce(self.ctx, id)?,
        };

        self.chain.push(id);
        let resolved = self.value(&produced);
        self.chain.pop();
        let resolved = resolved?;

        if !entry.domain.accepts(&resolved) {
            return Err(ResolveError::DomainMismatch {
                token: id,
                expected: entry.domain.name(),
                found: kind_name(&resolved),
            });
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{IntrinsicConcat, ValueDomain};
    use serde_json::json;
    use std::rc::Rc;

    fn resolve_in(tree: &Tree, value: &Value) -> Result<Value, ResolveError> {
        resolve(value, &ResolveContext::new(tree, tree.root()))
    }

    #[test]
    fn plain_values_are_identity() {
        let tree = Tree::new();
        let v = json!({"a": [1, 2.5, "x", null, true], "b": {"c": "d"}});
        assert_eq!(resolve_in(&tree, &v).unwrap(), v);
    }

    #[test]
    fn pure_sentinel_keeps_type() {
        let tree = Tree::new();
        let n = tree.tokens().lazy(ValueDomain::Number, "n", |_| Ok(json!(42)));
        let out = resolve_in(&tree, &json!({ "port": n.as_string() })).unwrap();
        assert_eq!(out, json!({"port": 42}));
    }

    #[test]
    fn embedded_tokens_are_stringified() {
        let tree = Tree::new();
        let n = tree.tokens().lazy(ValueDomain::Number, "n", |_| Ok(json!(8080)));
        let out = resolve_in(&tree, &json!(format!("port-{}", n.as_string()))).unwrap();
        assert_eq!(out, json!("port-8080"));
    }

    #[test]
    fn number_tokens_resolve_in_place() {
        let tree = Tree::new();
        let n = tree.tokens().number("n", |_| Ok(json!(3)));
        let v = json!({ "count": n });
        assert_eq!(resolve_in(&tree, &v).unwrap(), json!({"count": 3}));
    }

    #[test]
    fn list_tokens_are_spliced() {
        let tree = Tree::new();
        let list = tree.tokens().list("azs", |_| Ok(json!(["a", "b"])));
        let mut items = vec![json!("first")];
        items.extend(list.into_iter().map(Value::String));
        items.push(json!("last"));
        let out = resolve_in(&tree, &Value::Array(items)).unwrap();
        assert_eq!(out, json!(["first", "a", "b", "last"]));
    }

    #[test]
    fn list_intrinsic_replaces_its_array() {
        let tree = Tree::new();
        let list = tree
            .tokens()
            .list("zones", |_| Ok(json!({"Fn::GetAtt": ["X", "Zones"]})));
        let out = resolve_in(&tree, &json!({ "Zones": list })).unwrap();
        assert_eq!(out, json!({"Zones": {"Fn::GetAtt": ["X", "Zones"]}}));
    }

    #[test]
    fn list_intrinsic_with_siblings_is_rejected() {
        let tree = Tree::new();
        let list = tree
            .tokens()
            .list("zones", |_| Ok(json!({"Fn::GetAtt": ["X", "Zones"]})));
        let mut items = vec![json!("extra")];
        items.extend(list.into_iter().map(Value::String));
        let err = resolve_in(&tree, &Value::Array(items)).unwrap_err();
        assert!(matches!(err, ResolveError::ListIntrinsicSpliced { .. }));
    }

    #[test]
    fn list_token_inside_string_is_rejected() {
        let tree = Tree::new();
        let list = tree.tokens().list("azs", |_| Ok(json!(["a"])));
        let err = resolve_in(&tree, &json!(format!("x-{}", list[0]))).unwrap_err();
        assert!(matches!(err, ResolveError::ListTokenInString { .. }));
    }

    #[test]
    fn keys_resolve_to_strings() {
        let tree = Tree::new();
        let k = tree.tokens().string("k", |_| Ok(json!("name")));
        let mut map = Map::new();
        map.insert(k, json!("v"));
        let out = resolve_in(&tree, &Value::Object(map)).unwrap();
        assert_eq!(out, json!({"name": "v"}));
    }

    #[test]
    fn non_string_key_is_rejected() {
        let tree = Tree::new();
        let k = tree.tokens().string("k", |_| Ok(json!({"Ref": "X"})));
        let mut map = Map::new();
        map.insert(k, json!("v"));
        let err = resolve_in(&tree, &Value::Object(map)).unwrap_err();
        assert!(matches!(err, ResolveError::NonStringKey { found: "object", .. }));
    }

    #[test]
    fn tokens_producing_tokens_are_followed() {
        let tree = Tree::new();
        let inner = tree.tokens().string("inner", |_| Ok(json!("deep")));
        let outer = tree
            .tokens()
            .string("outer", move |_| Ok(json!(format!("<{inner}>"))));
        assert_eq!(resolve_in(&tree, &json!(outer)).unwrap(), json!("<deep>"));
    }

    #[test]
    fn two_token_cycle_is_detected() {
        let tree = Tree::new();
        let slot: Rc<std::cell::RefCell<String>> = Rc::default();
        let back = slot.clone();
        let t2 = tree.tokens().lazy(ValueDomain::String, "t2", move |_| {
            Ok(json!(back.borrow().clone()))
        });
        let t2_str = t2.as_string();
        let t1 = tree
            .tokens()
            .lazy(ValueDomain::String, "t1", move |_| Ok(json!(t2_str.clone())));
        *slot.borrow_mut() = t1.as_string();

        match resolve_in(&tree, &json!(t1.as_string())).unwrap_err() {
            ResolveError::Cycle { tokens, reductions } => {
                assert_eq!(reductions, DEFAULT_MAX_REDUCTIONS);
                assert!(tokens.contains(&t1.id()));
                assert!(tokens.contains(&t2.id()));
                assert_eq!(tokens.len(), 2);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn reduction_bound_is_configurable() {
        let tree = Tree::new();
        let mut current = tree.tokens().string("base", |_| Ok(json!("x")));
        for i in 0..5 {
            let prev = current.clone();
            current = tree
                .tokens()
                .string(&format!("t{i}"), move |_| Ok(json!(prev.clone())));
        }
        let ctx = ResolveContext::new(&tree, tree.root());
        assert_eq!(resolve(&json!(current), &ctx).unwrap(), json!("x"));

        let tight = ctx.with_options(ResolveOptions { max_reductions: 3 });
        assert!(matches!(
            resolve(&json!(current), &tight),
            Err(ResolveError::Cycle { reductions: 3, .. })
        ));
    }

    #[test]
    fn producer_failure_names_token() {
        let tree = Tree::new();
        let t = tree
            .tokens()
            .lazy(ValueDomain::String, "bad", |_| Err(ResolveError::failed("boom")));
        match resolve_in(&tree, &json!(t.as_string())).unwrap_err() {
            ResolveError::ProducerFailed { token, message } => {
                assert_eq!(token, Some(t.id()));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn domain_mismatch_is_reported() {
        let tree = Tree::new();
        let t = tree
            .tokens()
            .lazy(ValueDomain::Number, "n", |_| Ok(json!("not a number")));
        assert!(matches!(
            resolve_in(&tree, &t.to_value()).unwrap_err(),
            ResolveError::DomainMismatch { expected: "number", found: "string", .. }
        ));
    }

    #[test]
    fn unknown_sentinel_is_rejected() {
        let tree = Tree::new();
        let foreign = Tree::new();
        let t = foreign.tokens().string("x", |_| Ok(json!("x")));
        assert!(matches!(
            resolve_in(&tree, &json!(t)).unwrap_err(),
            ResolveError::UnknownToken(_)
        ));
    }

    #[test]
    fn resolution_is_idempotent() {
        let tree = Tree::new();
        let t = tree.tokens().string("t", |_| Ok(json!({"Ref": "Bucket"})));
        let v = json!({"a": format!("arn:{t}"), "b": t});
        let ctx = ResolveContext::new(&tree, tree.root()).with_concat(&IntrinsicConcat);
        let once = resolve(&v, &ctx).unwrap();
        let twice = resolve(&once, &ctx).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            once,
            json!({
                "a": {"Fn::Join": ["", ["arn:", {"Ref": "Bucket"}]]},
                "b": {"Ref": "Bucket"}
            })
        );
    }

    #[test]
    fn producers_see_scope() {
        let mut tree = Tree::new();
        let child = tree.add_child(tree.root(), "Child").unwrap();
        let t = tree
            .tokens()
            .string("path", |ctx| Ok(json!(ctx.tree.path(ctx.scope))));
        let ctx = ResolveContext::new(&tree, child);
        assert_eq!(resolve(&json!(t), &ctx).unwrap(), json!("Child"));
    }
}

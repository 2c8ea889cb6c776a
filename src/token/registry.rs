//! token::registry
//!
//! Allocation of tokens and storage of their producers.
//!
//! # Invariants
//!
//! - Ids come from one process-wide counter, so two registries never hand
//!   out the same id
//! - Registration never invokes the producer
//! - The registry lives inside the tree and is usable through `&Tree`; all
//!   interior mutability is confined here

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use super::encoding::{sanitize_hint, TokenId};
use super::resolve::{ResolveContext, ResolveError};
use super::{Token, ValueDomain};
use crate::construct::NodeIdx;
use crate::reference::{RefAttribute, Reference};

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// A deferred producer.
pub type ProducerFn = dyn Fn(&ResolveContext<'_>) -> Result<Value, ResolveError>;

/// Where a token's value comes from.
#[derive(Clone)]
pub enum TokenSource {
    /// A fixed value, possibly containing further tokens.
    Literal(Value),
    /// A closure evaluated at resolution time.
    Lazy(Rc<ProducerFn>),
    /// An attribute of a node in the tree.
    Reference(Rc<Reference>),
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            TokenSource::Lazy(_) => f.write_str("Lazy(..)"),
            TokenSource::Reference(r) => f.debug_tuple("Reference").field(r).finish(),
        }
    }
}

/// A registered token.
#[derive(Debug)]
pub struct TokenEntry {
    pub id: TokenId,
    pub domain: ValueDomain,
    pub hint: String,
    pub source: TokenSource,
}

impl TokenEntry {
    /// The handle for this entry.
    pub fn token(&self) -> Token {
        Token::new(self.id, self.domain, self.hint.clone())
    }

    /// The reference behind this token, if it is one.
    pub fn reference(&self) -> Option<&Rc<Reference>> {
        match &self.source {
            TokenSource::Reference(r) => Some(r),
            _ => None,
        }
    }
}

/// Registry of every token known to one tree.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    entries: RefCell<BTreeMap<TokenId, Rc<TokenEntry>>>,
    references: RefCell<BTreeMap<(NodeIdx, RefAttribute), TokenId>>,
}

impl TokenRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer and return its handle.
    pub fn register(&self, source: TokenSource, domain: ValueDomain, hint: &str) -> Token {
        let id = TokenId(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed));
        let entry = Rc::new(TokenEntry {
            id,
            domain,
            hint: sanitize_hint(hint),
            source,
        });
        let token = entry.token();
        self.entries.borrow_mut().insert(id, entry);
        token
    }

    /// Register a fixed value.
    pub fn literal(&self, value: Value, domain: ValueDomain, hint: &str) -> Token {
        self.register(TokenSource::Literal(value), domain, hint)
    }

    /// Register a closure producer.
    pub fn lazy<F>(&self, domain: ValueDomain, hint: &str, producer: F) -> Token
    where
        F: Fn(&ResolveContext<'_>) -> Result<Value, ResolveError> + 'static,
    {
        self.register(TokenSource::Lazy(Rc::new(producer)), domain, hint)
    }

    /// A lazy string, returned as its embeddable sentinel.
    pub fn string<F>(&self, hint: &str, producer: F) -> String
    where
        F: Fn(&ResolveContext<'_>) -> Result<Value, ResolveError> + 'static,
    {
        self.lazy(ValueDomain::String, hint, producer).as_string()
    }

    /// A lazy number, returned as its reserved double.
    pub fn number<F>(&self, hint: &str, producer: F) -> f64
    where
        F: Fn(&ResolveContext<'_>) -> Result<Value, ResolveError> + 'static,
    {
        self.lazy(ValueDomain::Number, hint, producer).as_number()
    }

    /// A lazy list, returned as its one-element sentinel list.
    pub fn list<F>(&self, hint: &str, producer: F) -> Vec<String>
    where
        F: Fn(&ResolveContext<'_>) -> Result<Value, ResolveError> + 'static,
    {
        self.lazy(ValueDomain::List, hint, producer).as_list()
    }

    /// Look up a token by id.
    pub fn lookup(&self, id: TokenId) -> Option<Rc<TokenEntry>> {
        self.entries.borrow().get(&id).cloned()
    }

    /// Number of registered tokens.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether no token has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Every reference registered so far, in token order.
    pub(crate) fn references(&self) -> Vec<Rc<Reference>> {
        self.entries
            .borrow()
            .values()
            .filter_map(|e| e.reference().cloned())
            .collect()
    }

    /// The token for an attribute of a node, registering it on first use.
    ///
    /// Asking twice for the same attribute returns the same token, so the
    /// attribute is exported at most once however often it is consumed.
    pub(crate) fn reference(&self, target: NodeIdx, attribute: RefAttribute, domain: ValueDomain) -> Token {
        let key = (target, attribute.clone());
        if let Some(existing) = self.references.borrow().get(&key).copied() {
            if let Some(entry) = self.lookup(existing) {
                return entry.token();
            }
        }

        let hint = attribute.hint();
        let reference = Rc::new(Reference::new(target, attribute, domain));
        let token = self.register(TokenSource::Reference(reference), domain, &hint);
        self.references.borrow_mut().insert(key, token.id());
        token
    }
}

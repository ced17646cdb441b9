use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{ContentSide, Exchange, NodeRef, RequestContext};

pub const REQUEST_CONTENT: &str = "$requestContent";
pub const RESPONSE_CONTENT: &str = "$responseContent";
/// The node the current invocation is applied to, on the phase's side
pub const CONTENT: &str = "$content";
pub const CONTEXT: &str = "$context";
pub const EXCHANGE: &str = "$exchange";
pub const LOGGER: &str = "$logger";

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Live node of the request or response payload
    Node(NodeRef),
    /// Read-only snapshot value
    Value(Value),
}

/// Variables visible to one script invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    vars: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: impl Into<String>, binding: Binding) -> Option<Binding> {
        self.vars.insert(name.into(), binding)
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.vars.get(name)
    }

    pub fn node(&self, name: &str) -> Option<NodeRef> {
        match self.vars.get(name) {
            Some(Binding::Node(node)) => Some(*node),
            _ => None,
        }
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.vars.get(name) {
            Some(Binding::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Produces a fresh binding set for every script invocation
pub trait BindingBuilder: Send + Sync {
    fn build(&self, exchange: &Exchange, ctx: &RequestContext, logger: &str) -> Bindings;
}

/// Binds both payload roots, a `$context` summary, the `$exchange` and the `$logger` target
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBindingBuilder;

impl BindingBuilder for DefaultBindingBuilder {
    fn build(&self, exchange: &Exchange, ctx: &RequestContext, logger: &str) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.put(
            REQUEST_CONTENT,
            Binding::Node(NodeRef::root(ContentSide::Request)),
        );
        bindings.put(
            RESPONSE_CONTENT,
            Binding::Node(NodeRef::root(ContentSide::Response)),
        );
        bindings.put(CONTEXT, Binding::Value(ctx.describe()));
        bindings.put(EXCHANGE, Binding::Value(exchange.to_value()));
        bindings.put(LOGGER, Binding::Value(Value::String(logger.to_string())));
        bindings
    }
}

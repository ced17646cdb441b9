use itertools::Itertools;
use log::{debug, info};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::logic::bindings::{Binding, Bindings, CONTENT, LOGGER, RESPONSE_CONTENT};
use crate::model::{RequestContext, ScriptError, ScriptRef};

/// Runs one transformer script against a binding set.
///
/// Implementations mutate the payload through the node handles found in `bindings`,
/// which point into the arenas owned by `ctx`.
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(
        &self,
        script: &ScriptRef,
        bindings: &Bindings,
        ctx: &mut RequestContext,
    ) -> Result<(), ScriptError>;
}

/// State an operation runs against
pub struct ScriptEnv<'a> {
    pub bindings: &'a Bindings,
    pub ctx: &'a mut RequestContext,
}

pub type Operation = fn(args: &Map<String, Value>, env: &mut ScriptEnv<'_>) -> Result<(), ScriptError>;

const DEFAULT_LOGGER: &str = "docstore::scripts";

/// Built-in evaluator for scripts written as a JSON list of operations.
///
/// ```json
/// [
///   {"op": "set", "path": "meta.seen", "value": true},
///   {"op": "copy", "from": "$context.database", "path": "db"},
///   {"op": "unset", "target": "$requestContent", "path": "password"}
/// ]
/// ```
///
/// Every operation mutates the node bound to `target`. Without one it mutates `$content`,
/// or `$responseContent` when `$content` is not bound.
pub struct OpsEvaluator {
    ops: HashMap<&'static str, Operation>,
    scripts: HashMap<String, Value>,
}

impl Default for OpsEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl OpsEvaluator {
    pub fn new() -> Self {
        let mut ops: HashMap<&'static str, Operation> = HashMap::new();
        ops.insert("set", op_set as Operation);
        ops.insert("unset", op_unset as Operation);
        ops.insert("rename", op_rename as Operation);
        ops.insert("copy", op_copy as Operation);
        ops.insert("log", op_log as Operation);
        ops.insert("fail", op_fail as Operation);
        Self {
            ops,
            scripts: HashMap::new(),
        }
    }

    /// Evaluator that also resolves named scripts from `scripts`
    pub fn with_scripts(scripts: HashMap<String, Value>) -> Self {
        Self {
            scripts,
            ..Self::new()
        }
    }

    pub fn register(&mut self, name: &'static str, op: Operation) -> Option<Operation> {
        self.ops.insert(name, op)
    }

    pub fn register_script(&mut self, name: impl Into<String>, source: Value) -> Option<Value> {
        self.scripts.insert(name.into(), source)
    }

    pub fn has_script(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    fn source<'s>(&'s self, script: &'s ScriptRef) -> Result<Cow<'s, Value>, ScriptError> {
        let raw = match script {
            ScriptRef::Named(name) => self
                .scripts
                .get(name)
                .ok_or_else(|| ScriptError::UnknownScript(name.clone()))?,
            ScriptRef::Inline(source) => source,
        };

        match raw {
            Value::String(text) => serde_json::from_str(text)
                .map(Cow::Owned)
                .map_err(|e| ScriptError::Malformed(format!("script source is not JSON: {}", e))),
            other => Ok(Cow::Borrowed(other)),
        }
    }
}

impl ScriptEvaluator for OpsEvaluator {
    fn evaluate(
        &self,
        script: &ScriptRef,
        bindings: &Bindings,
        ctx: &mut RequestContext,
    ) -> Result<(), ScriptError> {
        let source = self.source(script)?;
        let source: &Value = &source;
        let steps: &[Value] = match source {
            Value::Array(steps) => steps,
            Value::Object(_) => std::slice::from_ref(source),
            _ => {
                return Err(ScriptError::Malformed(
                    "a script is an operation object or a list of them".to_string(),
                ))
            }
        };

        let mut env = ScriptEnv { bindings, ctx };
        for step in steps {
            let Value::Object(args) = step else {
                return Err(ScriptError::Malformed("operation must be an object".to_string()));
            };
            let name = args
                .get("op")
                .and_then(Value::as_str)
                .ok_or_else(|| ScriptError::Malformed("operation without 'op'".to_string()))?;
            let op = self
                .ops
                .get(name)
                .ok_or_else(|| ScriptError::UnknownOperation {
                    op: name.to_string(),
                    known: self.ops.keys().sorted().join(", "),
                })?;

            debug!("Running script operation '{}' of {}", name, script);
            op(args, &mut env)?;
        }
        Ok(())
    }
}

impl<'a> ScriptEnv<'a> {
    /// Fields of the node an operation mutates
    ///
    /// Without an explicit `target` this is `$content` when bound, else `$responseContent`.
    pub fn target_fields(&mut self, args: &Map<String, Value>) -> Result<&mut Map<String, Value>, ScriptError> {
        let default = if self.bindings.contains(CONTENT) {
            CONTENT
        } else {
            RESPONSE_CONTENT
        };
        let name = args
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or(default);

        let node = match self.bindings.get(name) {
            Some(Binding::Node(node)) => *node,
            Some(Binding::Value(_)) => return Err(ScriptError::NotANode(name.to_string())),
            None => return Err(ScriptError::Unbound(name.to_string())),
        };

        self.ctx
            .content_mut(node.side)
            .fields_mut(node.node)
            .ok_or_else(|| ScriptError::NotANode(name.to_string()))
    }

    /// Resolve `$var` or `$var.dotted.path` against the bindings
    pub fn resolve(&self, expr: &str) -> Result<Option<Value>, ScriptError> {
        let (var, path) = match expr.split_once('.') {
            Some((var, path)) => (var, Some(path)),
            None => (expr, None),
        };

        match (self.bindings.get(var), path) {
            (None, _) => Err(ScriptError::Unbound(var.to_string())),
            (Some(Binding::Node(node)), None) => {
                Ok(Some(self.ctx.content(node.side).render(node.node)))
            }
            (Some(Binding::Node(node)), Some(path)) => Ok(self
                .ctx
                .content(node.side)
                .fields(node.node)
                .and_then(|fields| map_get(fields, path))),
            (Some(Binding::Value(value)), None) => Ok(Some(value.clone())),
            (Some(Binding::Value(value)), Some(path)) => {
                Ok(value.as_object().and_then(|map| map_get(map, path)))
            }
        }
    }
}

fn require_str<'a>(args: &'a Map<String, Value>, op: &str, arg: &str) -> Result<&'a str, ScriptError> {
    args.get(arg)
        .and_then(Value::as_str)
        .ok_or_else(|| ScriptError::MissingArgument {
            op: op.to_string(),
            arg: arg.to_string(),
        })
}

fn op_set(args: &Map<String, Value>, env: &mut ScriptEnv<'_>) -> Result<(), ScriptError> {
    let path = require_str(args, "set", "path")?;
    let value = args
        .get("value")
        .cloned()
        .ok_or_else(|| ScriptError::MissingArgument {
            op: "set".to_string(),
            arg: "value".to_string(),
        })?;
    map_set(env.target_fields(args)?, path, value);
    Ok(())
}

fn op_unset(args: &Map<String, Value>, env: &mut ScriptEnv<'_>) -> Result<(), ScriptError> {
    let path = require_str(args, "unset", "path")?;
    map_remove(env.target_fields(args)?, path);
    Ok(())
}

fn op_rename(args: &Map<String, Value>, env: &mut ScriptEnv<'_>) -> Result<(), ScriptError> {
    let from = require_str(args, "rename", "from")?;
    let to = require_str(args, "rename", "to")?;
    let fields = env.target_fields(args)?;
    if let Some(value) = map_remove(fields, from) {
        map_set(fields, to, value);
    }
    Ok(())
}

fn op_copy(args: &Map<String, Value>, env: &mut ScriptEnv<'_>) -> Result<(), ScriptError> {
    let from = require_str(args, "copy", "from")?;
    let path = require_str(args, "copy", "path")?;
    // A missing source leaves the target untouched
    if let Some(value) = env.resolve(from)? {
        map_set(env.target_fields(args)?, path, value);
    }
    Ok(())
}

fn op_log(args: &Map<String, Value>, env: &mut ScriptEnv<'_>) -> Result<(), ScriptError> {
    let message = require_str(args, "log", "message")?;
    let target = env
        .bindings
        .value(LOGGER)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_LOGGER);
    info!(target: target, "{}", message);
    Ok(())
}

fn op_fail(args: &Map<String, Value>, _env: &mut ScriptEnv<'_>) -> Result<(), ScriptError> {
    let message = args
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("script failed");
    Err(ScriptError::Raised(message.to_string()))
}

pub fn map_get(map: &Map<String, Value>, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = map.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

/// Set a dotted path, creating (or replacing non-object) intermediate values
pub fn map_set(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                map_set(inner, rest, value);
            }
        }
    }
}

pub fn map_remove(map: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => map.remove(path),
        Some((head, rest)) => match map.get_mut(head) {
            Some(Value::Object(inner)) => map_remove(inner, rest),
            _ => None,
        },
    }
}

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::model::TransformError;

/// Key of the transformer list inside a database or collection property document
pub const RTS_ELEMENT_NAME: &str = "rts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Request,
    Response,
}

impl Phase {
    /// Binding name that points a script at its target node
    pub fn content_var(&self) -> &'static str {
        match self {
            Phase::Request => "$requestContent",
            Phase::Response => "$responseContent",
        }
    }
}

impl FromStr for Phase {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "REQUEST" => Ok(Phase::Request),
            "RESPONSE" => Ok(Phase::Response),
            other => Err(TransformError::invalid(format!(
                "unknown phase '{}', expected REQUEST or RESPONSE",
                other
            ))),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Request => f.write_str("REQUEST"),
            Phase::Response => f.write_str("RESPONSE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    This,
    Children,
}

impl FromStr for Scope {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "THIS" => Ok(Scope::This),
            "CHILDREN" => Ok(Scope::Children),
            other => Err(TransformError::invalid(format!(
                "unknown scope '{}', expected THIS or CHILDREN",
                other
            ))),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::This => f.write_str("THIS"),
            Scope::Children => f.write_str("CHILDREN"),
        }
    }
}

/// Hierarchy level whose property document declared a transformer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerLevel {
    Database,
    Collection,
}

impl fmt::Display for OwnerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerLevel::Database => f.write_str("database"),
            OwnerLevel::Collection => f.write_str("collection"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptRef {
    /// Script registered with the evaluator under this name
    Named(String),
    /// Script source carried in the metadata itself
    Inline(Value),
}

impl fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptRef::Named(name) => write!(f, "script '{}'", name),
            ScriptRef::Inline(_) => f.write_str("inline script"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepresentationTransformer {
    pub phase: Phase,
    pub scope: Scope,
    pub script: ScriptRef,
}

/// Read the transformer list declared in a property document.
///
/// Returns an empty list when the `rts` field is absent. A present but malformed
/// field is an error. The result keeps declaration order.
///
/// An entry without `phase` is a request transformer. Outside the request phase
/// (`request_phase_default_allowed == false`) it is still accepted, so the caller's
/// phase filter skips it instead of failing the whole list.
pub fn parse_transformers(
    props: &Map<String, Value>,
    request_phase_default_allowed: bool,
) -> Result<Vec<RepresentationTransformer>, TransformError> {
    let Some(raw) = props.get(RTS_ELEMENT_NAME) else {
        return Ok(Vec::new());
    };

    let Value::Array(entries) = raw else {
        return Err(TransformError::invalid(format!(
            "'{}' must be an array of transformer objects",
            RTS_ELEMENT_NAME
        )));
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_entry(entry, request_phase_default_allowed)
                .map_err(|e| match e {
                    TransformError::InvalidMetadata(msg) => TransformError::invalid(format!(
                        "{}[{}]: {}",
                        RTS_ELEMENT_NAME, index, msg
                    )),
                    other => other,
                })
        })
        .collect()
}

/// Check a property document before it is stored
pub fn validate_metadata(props: &Map<String, Value>) -> Result<(), TransformError> {
    parse_transformers(props, true).map(|_| ())
}

fn parse_entry(
    entry: &Value,
    request_phase_default_allowed: bool,
) -> Result<RepresentationTransformer, TransformError> {
    let Value::Object(fields) = entry else {
        return Err(TransformError::invalid("transformer must be an object"));
    };

    let phase = match fields.get("phase") {
        Some(Value::String(token)) => token.parse::<Phase>()?,
        Some(_) => return Err(TransformError::invalid("'phase' must be a string")),
        None => {
            if !request_phase_default_allowed {
                debug!("transformer without 'phase' defaults to REQUEST; skipped outside the request phase");
            }
            Phase::Request
        }
    };

    let scope = match fields.get("scope") {
        Some(Value::String(token)) => token.parse::<Scope>()?,
        Some(_) => return Err(TransformError::invalid("'scope' must be a string")),
        None => Scope::Children,
    };

    let script = match (fields.get("name"), fields.get("script")) {
        (Some(_), Some(_)) => {
            return Err(TransformError::invalid(
                "declare either 'name' or 'script', not both",
            ))
        }
        (Some(Value::String(name)), None) if !name.is_empty() => ScriptRef::Named(name.clone()),
        (Some(_), None) => {
            return Err(TransformError::invalid("'name' must be a non-empty string"))
        }
        (None, Some(Value::Null)) | (None, None) => {
            return Err(TransformError::invalid("missing script reference ('name' or 'script')"))
        }
        (None, Some(source)) => ScriptRef::Inline(source.clone()),
    };

    Ok(RepresentationTransformer {
        phase,
        scope,
        script,
    })
}

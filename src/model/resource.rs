use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::Id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    /// Property document, including the `rts` transformer list when declared
    pub props: Map<String, Value>,
    pub created_at: String, // ISO 8601 timestamp
    pub updated_at: String,
}

impl Database {
    pub fn new(name: String, props: Map<String, Value>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            name,
            props,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn replace_props(&mut self, props: Map<String, Value>) {
        self.props = props;
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub db_name: String,
    pub name: String,
    pub props: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
}

impl Collection {
    pub fn new(db_name: String, name: String, props: Map<String, Value>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            db_name,
            name,
            props,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn replace_props(&mut self, props: Map<String, Value>) {
        self.props = props;
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Id,
    /// Document body without `_id`
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: Id, mut fields: Map<String, Value>) -> Self {
        fields.remove("_id");
        Self { id, fields }
    }
}

/// Binary file stored in a collection's file bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: Id,
    /// Descriptive metadata (`contentType`, `length`, `uploadDate`, plus anything a script added)
    pub metadata: Map<String, Value>,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl StoredFile {
    pub fn new(id: Id, content_type: Option<String>, content: Vec<u8>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            "contentType".to_string(),
            Value::String(content_type.unwrap_or_else(|| "application/octet-stream".to_string())),
        );
        metadata.insert("length".to_string(), Value::from(content.len()));
        metadata.insert(
            "uploadDate".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        Self {
            id,
            metadata,
            content,
        }
    }

    pub fn content_type(&self) -> &str {
        self.metadata
            .get("contentType")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
    }
}

/// Merge `patch` into `target` at the top level; `null` values remove fields
pub fn merge_fields(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

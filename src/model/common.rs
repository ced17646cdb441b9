use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type Id = String;

/// Position of the requested resource in the database → collection → document/file hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    Database,
    Collection,
    Document,
    File,
}

impl ResourceType {
    /// Files are a document variant as far as transformers are concerned
    pub fn is_document_like(&self) -> bool {
        matches!(self, ResourceType::Document | ResourceType::File)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Database => "DATABASE",
            ResourceType::Collection => "COLLECTION",
            ResourceType::Document => "DOCUMENT",
            ResourceType::File => "FILE",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Verbs that carry a request body the store will persist
    pub fn is_write(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

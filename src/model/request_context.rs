use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::{ContentTree, Method, NodeId, Phase, ResourceType};

/// HTTP-level view of the current request handed to transformer scripts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl Exchange {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Which payload arena a node handle points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentSide {
    Request,
    Response,
}

impl From<Phase> for ContentSide {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Request => ContentSide::Request,
            Phase::Response => ContentSide::Response,
        }
    }
}

/// Stable reference to one node of the request or response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub side: ContentSide,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(side: ContentSide, node: NodeId) -> Self {
        Self { side, node }
    }

    pub fn root(side: ContentSide) -> Self {
        Self {
            side,
            node: NodeId::ROOT,
        }
    }
}

/// Per-request state the transformer engine reads and mutates
#[derive(Debug, Clone)]
pub struct RequestContext {
    resource_type: ResourceType,
    method: Method,
    db_name: String,
    coll_name: Option<String>,
    resource_id: Option<String>,
    db_props: Map<String, Value>,
    coll_props: Map<String, Value>,
    request_content: ContentTree,
    response_content: ContentTree,
}

impl RequestContext {
    pub fn new(resource_type: ResourceType, method: Method, db_name: impl Into<String>) -> Self {
        Self {
            resource_type,
            method,
            db_name: db_name.into(),
            coll_name: None,
            resource_id: None,
            db_props: Map::new(),
            coll_props: Map::new(),
            request_content: ContentTree::new(),
            response_content: ContentTree::new(),
        }
    }

    pub fn with_collection(mut self, coll_name: impl Into<String>) -> Self {
        self.coll_name = Some(coll_name.into());
        self
    }

    /// Id of the document or file addressed by the request
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_db_props(mut self, props: Map<String, Value>) -> Self {
        self.db_props = props;
        self
    }

    pub fn with_coll_props(mut self, props: Map<String, Value>) -> Self {
        self.coll_props = props;
        self
    }

    pub fn with_request_content(mut self, content: ContentTree) -> Self {
        self.request_content = content;
        self
    }

    pub fn with_response_content(mut self, content: ContentTree) -> Self {
        self.response_content = content;
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn coll_name(&self) -> Option<&str> {
        self.coll_name.as_deref()
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn db_props(&self) -> &Map<String, Value> {
        &self.db_props
    }

    pub fn coll_props(&self) -> &Map<String, Value> {
        &self.coll_props
    }

    pub fn request_content(&self) -> &ContentTree {
        &self.request_content
    }

    pub fn request_content_mut(&mut self) -> &mut ContentTree {
        &mut self.request_content
    }

    pub fn response_content(&self) -> &ContentTree {
        &self.response_content
    }

    pub fn response_content_mut(&mut self) -> &mut ContentTree {
        &mut self.response_content
    }

    pub fn set_response_content(&mut self, content: ContentTree) {
        self.response_content = content;
    }

    pub fn content(&self, side: ContentSide) -> &ContentTree {
        match side {
            ContentSide::Request => &self.request_content,
            ContentSide::Response => &self.response_content,
        }
    }

    pub fn content_mut(&mut self, side: ContentSide) -> &mut ContentTree {
        match side {
            ContentSide::Request => &mut self.request_content,
            ContentSide::Response => &mut self.response_content,
        }
    }

    pub fn into_request_content(self) -> ContentTree {
        self.request_content
    }

    pub fn into_response_content(self) -> ContentTree {
        self.response_content
    }

    /// Summary of the request exposed to scripts as `$context`
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "resourceType": self.resource_type,
            "method": self.method,
            "database": self.db_name,
            "collection": self.coll_name,
            "id": self.resource_id,
            "dbProps": self.db_props,
            "collProps": self.coll_props,
        })
    }
}

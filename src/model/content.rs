use serde_json::{Map, Value};

/// Key under which a representation embeds its child resources
pub const EMBEDDED_KEY: &str = "_embedded";

/// Kinds of child lists a representation can embed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedKind {
    /// Databases listed by the server root
    Database,
    SubCollection,
    Document,
    File,
}

impl EmbedKind {
    pub fn key(&self) -> &'static str {
        match self {
            EmbedKind::Database => "rh:db",
            EmbedKind::SubCollection => "rh:coll",
            EmbedKind::Document => "rh:doc",
            EmbedKind::File => "rh:file",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "rh:db" => Some(EmbedKind::Database),
            "rh:coll" => Some(EmbedKind::SubCollection),
            "rh:doc" => Some(EmbedKind::Document),
            "rh:file" => Some(EmbedKind::File),
            _ => None,
        }
    }
}

/// Handle to a node inside one [`ContentTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub fields: Map<String, Value>,
    /// Child lists in the order they were embedded, keyed by kind key
    embedded: Vec<(String, Vec<NodeId>)>,
    /// Entries of `_embedded` that are not child lists, passed through untouched
    embedded_other: Map<String, Value>,
}

impl Node {
    pub fn embedded_keys(&self) -> impl Iterator<Item = &str> {
        self.embedded.iter().map(|(key, _)| key.as_str())
    }

    fn list(&self, key: &str) -> Option<&[NodeId]> {
        self.embedded
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, ids)| ids.as_slice())
    }

    fn list_mut(&mut self, key: &str) -> &mut Vec<NodeId> {
        let position = match self.embedded.iter().position(|(k, _)| k == key) {
            Some(position) => position,
            None => {
                self.embedded.push((key.to_string(), Vec::new()));
                self.embedded.len() - 1
            }
        };
        &mut self.embedded[position].1
    }
}

/// Arena holding a request or response payload.
///
/// Node 0 is the payload root. Children embedded in a listing are separate nodes
/// referenced by [`NodeId`], so a script handed a child handle mutates the very
/// node that [`ContentTree::to_value`] later serializes.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentTree {
    nodes: Vec<Node>,
}

impl Default for ContentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let mut tree = Self::new();
        tree.nodes[0].fields = fields;
        tree
    }

    /// Build a tree from a JSON object, lifting any `_embedded` section into child nodes
    pub fn from_json(object: Map<String, Value>) -> Self {
        let mut tree = Self::new();
        tree.fill(NodeId::ROOT, object);
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    pub fn root_fields(&self) -> &Map<String, Value> {
        &self.nodes[0].fields
    }

    pub fn root_fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.nodes[0].fields
    }

    pub fn fields(&self, id: NodeId) -> Option<&Map<String, Value>> {
        self.get(id).map(|node| &node.fields)
    }

    pub fn fields_mut(&mut self, id: NodeId) -> Option<&mut Map<String, Value>> {
        self.get_mut(id).map(|node| &mut node.fields)
    }

    /// Append a child under `parent` in the list for `kind`; returns `None` for an unknown parent
    pub fn embed(&mut self, parent: NodeId, kind: EmbedKind, fields: Map<String, Value>) -> Option<NodeId> {
        self.embed_under_key(parent, kind.key(), fields)
    }

    /// Embedded children of `parent` for a raw kind key, in embedding order
    pub fn embedded(&self, parent: NodeId, key: &str) -> Option<&[NodeId]> {
        self.get(parent).and_then(|node| node.list(key))
    }

    fn embed_under_key(&mut self, parent: NodeId, key: &str, object: Map<String, Value>) -> Option<NodeId> {
        if parent.0 >= self.nodes.len() {
            return None;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::default());
        self.nodes[parent.0].list_mut(key).push(id);
        self.fill(id, object);
        Some(id)
    }

    fn fill(&mut self, id: NodeId, mut object: Map<String, Value>) {
        let embedded = object.remove(EMBEDDED_KEY);
        self.nodes[id.0].fields = object;

        match embedded {
            Some(Value::Object(lists)) => {
                for (key, list) in lists {
                    match list {
                        // Only lists of objects become nodes; anything else is carried verbatim
                        Value::Array(items) if items.iter().all(Value::is_object) => {
                            // Make sure an explicitly empty list survives a round trip
                            self.nodes[id.0].list_mut(&key);
                            for item in items {
                                if let Value::Object(child) = item {
                                    self.embed_under_key(id, &key, child);
                                }
                            }
                        }
                        other => {
                            self.nodes[id.0].embedded_other.insert(key, other);
                        }
                    }
                }
            }
            Some(other) => {
                self.nodes[id.0].fields.insert(EMBEDDED_KEY.to_string(), other);
            }
            None => {}
        }
    }

    /// Serialize the whole tree starting at the root
    pub fn to_value(&self) -> Value {
        self.render(NodeId::ROOT)
    }

    /// Serialize the subtree at `id`; an unknown id renders as `null`
    pub fn render(&self, id: NodeId) -> Value {
        let Some(node) = self.get(id) else {
            return Value::Null;
        };

        let mut out = node.fields.clone();
        if !node.embedded.is_empty() || !node.embedded_other.is_empty() {
            let mut lists = node.embedded_other.clone();
            for (key, ids) in &node.embedded {
                let items = ids.iter().map(|child| self.render(*child)).collect();
                lists.insert(key.clone(), Value::Array(items));
            }
            out.insert(EMBEDDED_KEY.to_string(), Value::Object(lists));
        }
        Value::Object(out)
    }
}

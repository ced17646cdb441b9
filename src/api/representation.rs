use serde_json::{Map, Value};

use crate::model::{
    Collection, ContentTree, Database, Document, EmbedKind, StoredFile, EMBEDDED_KEY,
};

/// Fields the server adds to representations; never persisted from a request body
const RESERVED_FIELDS: &[&str] = &["_type", "_createdOn", "_lastUpdatedOn", "_returned", EMBEDDED_KEY];

fn props_fields(
    id: &str,
    kind: &str,
    props: &Map<String, Value>,
    created_at: &str,
    updated_at: &str,
) -> Map<String, Value> {
    let mut fields = props.clone();
    fields.insert("_id".to_string(), Value::String(id.to_string()));
    fields.insert("_type".to_string(), Value::String(kind.to_string()));
    fields.insert("_createdOn".to_string(), Value::String(created_at.to_string()));
    fields.insert("_lastUpdatedOn".to_string(), Value::String(updated_at.to_string()));
    fields
}

fn document_fields(doc: &Document) -> Map<String, Value> {
    let mut fields = doc.fields.clone();
    fields.insert("_id".to_string(), Value::String(doc.id.clone()));
    fields
}

fn file_fields(file: &StoredFile) -> Map<String, Value> {
    let mut fields = file.metadata.clone();
    fields.insert("_id".to_string(), Value::String(file.id.clone()));
    fields
}

pub fn root_representation(databases: &[Database]) -> ContentTree {
    let mut fields = Map::new();
    fields.insert("_type".to_string(), Value::String("ROOT".to_string()));
    fields.insert("_returned".to_string(), Value::from(databases.len()));

    let mut tree = ContentTree::from_fields(fields);
    let root = tree.root();
    for db in databases {
        let child = props_fields(&db.name, "DB", &db.props, &db.created_at, &db.updated_at);
        tree.embed(root, EmbedKind::Database, child);
    }
    tree
}

/// Database properties with its collections embedded as `rh:coll`
pub fn database_representation(db: &Database, collections: &[Collection]) -> ContentTree {
    let mut fields = props_fields(&db.name, "DB", &db.props, &db.created_at, &db.updated_at);
    fields.insert("_returned".to_string(), Value::from(collections.len()));

    let mut tree = ContentTree::from_fields(fields);
    let root = tree.root();
    for coll in collections {
        let child = props_fields(
            &coll.name,
            "COLLECTION",
            &coll.props,
            &coll.created_at,
            &coll.updated_at,
        );
        tree.embed(root, EmbedKind::SubCollection, child);
    }
    tree
}

/// Collection properties with its documents (`rh:doc`) and files (`rh:file`) embedded
pub fn collection_representation(
    coll: &Collection,
    documents: &[Document],
    files: &[StoredFile],
) -> ContentTree {
    let mut fields = props_fields(
        &coll.name,
        "COLLECTION",
        &coll.props,
        &coll.created_at,
        &coll.updated_at,
    );
    fields.insert(
        "_returned".to_string(),
        Value::from(documents.len() + files.len()),
    );

    let mut tree = ContentTree::from_fields(fields);
    let root = tree.root();
    for doc in documents {
        tree.embed(root, EmbedKind::Document, document_fields(doc));
    }
    for file in files {
        tree.embed(root, EmbedKind::File, file_fields(file));
    }
    tree
}

pub fn document_representation(doc: &Document) -> ContentTree {
    ContentTree::from_fields(document_fields(doc))
}

pub fn file_representation(file: &StoredFile) -> ContentTree {
    ContentTree::from_fields(file_fields(file))
}

/// Root object of a (possibly transformed) tree, embedded lists included
pub fn root_object(tree: &ContentTree) -> Map<String, Value> {
    match tree.to_value() {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

/// Drop server-generated fields (and `_id`, which comes from the path) before persisting
pub fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in RESERVED_FIELDS {
        fields.remove(*key);
    }
    fields.remove("_id");
    fields
}

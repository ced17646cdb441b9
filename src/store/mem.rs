use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::{generate_id, Collection, Database, Document, Id, StoredFile};
use crate::store::traits::{
    CollectionStore, DatabaseStore, DocumentStore, FileStore, StoreError, StoreResult,
};

#[derive(Debug, Clone)]
struct CollectionEntry {
    collection: Collection,
    /// Insertion order is the store order listings report
    documents: Vec<Document>,
    files: Vec<StoredFile>,
}

#[derive(Debug, Clone)]
struct DatabaseEntry {
    database: Database,
    collections: BTreeMap<String, CollectionEntry>,
}

/// In-process store backing the REST surface
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: RwLock<BTreeMap<String, DatabaseEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn collection<'a>(
    databases: &'a BTreeMap<String, DatabaseEntry>,
    db: &str,
    coll: &str,
) -> StoreResult<&'a CollectionEntry> {
    databases
        .get(db)
        .and_then(|entry| entry.collections.get(coll))
        .ok_or_else(|| StoreError::NotFound(format!("Collection '{}/{}'", db, coll)))
}

fn collection_mut<'a>(
    databases: &'a mut BTreeMap<String, DatabaseEntry>,
    db: &str,
    coll: &str,
) -> StoreResult<&'a mut CollectionEntry> {
    databases
        .get_mut(db)
        .and_then(|entry| entry.collections.get_mut(coll))
        .ok_or_else(|| StoreError::NotFound(format!("Collection '{}/{}'", db, coll)))
}

/// Document ids are strings; other scalar `_id` values are stringified
fn id_from_fields(fields: &Map<String, Value>) -> Option<Id> {
    match fields.get("_id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait::async_trait]
impl DatabaseStore for MemoryStore {
    async fn get_database(&self, db: &str) -> StoreResult<Option<Database>> {
        Ok(self.databases.read().get(db).map(|entry| entry.database.clone()))
    }

    async fn list_databases(&self) -> StoreResult<Vec<Database>> {
        Ok(self
            .databases
            .read()
            .values()
            .map(|entry| entry.database.clone())
            .collect())
    }

    async fn upsert_database(&self, db: &str, props: Map<String, Value>) -> StoreResult<bool> {
        let mut databases = self.databases.write();
        match databases.get_mut(db) {
            Some(entry) => {
                entry.database.replace_props(props);
                Ok(false)
            }
            None => {
                databases.insert(
                    db.to_string(),
                    DatabaseEntry {
                        database: Database::new(db.to_string(), props),
                        collections: BTreeMap::new(),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn delete_database(&self, db: &str) -> StoreResult<bool> {
        Ok(self.databases.write().remove(db).is_some())
    }
}

#[async_trait::async_trait]
impl CollectionStore for MemoryStore {
    async fn get_collection(&self, db: &str, coll: &str) -> StoreResult<Option<Collection>> {
        Ok(self
            .databases
            .read()
            .get(db)
            .and_then(|entry| entry.collections.get(coll))
            .map(|entry| entry.collection.clone()))
    }

    async fn list_collections(&self, db: &str) -> StoreResult<Vec<Collection>> {
        let databases = self.databases.read();
        let entry = databases
            .get(db)
            .ok_or_else(|| StoreError::NotFound(format!("Database '{}'", db)))?;
        Ok(entry
            .collections
            .values()
            .map(|c| c.collection.clone())
            .collect())
    }

    async fn upsert_collection(
        &self,
        db: &str,
        coll: &str,
        props: Map<String, Value>,
    ) -> StoreResult<bool> {
        let mut databases = self.databases.write();
        let entry = databases
            .get_mut(db)
            .ok_or_else(|| StoreError::NotFound(format!("Database '{}'", db)))?;

        match entry.collections.get_mut(coll) {
            Some(existing) => {
                existing.collection.replace_props(props);
                Ok(false)
            }
            None => {
                entry.collections.insert(
                    coll.to_string(),
                    CollectionEntry {
                        collection: Collection::new(db.to_string(), coll.to_string(), props),
                        documents: Vec::new(),
                        files: Vec::new(),
                    },
                );
                Ok(true)
            }
        }
    }

    async fn delete_collection(&self, db: &str, coll: &str) -> StoreResult<bool> {
        Ok(self
            .databases
            .write()
            .get_mut(db)
            .map(|entry| entry.collections.remove(coll).is_some())
            .unwrap_or(false))
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get_document(&self, db: &str, coll: &str, id: &str) -> StoreResult<Option<Document>> {
        let databases = self.databases.read();
        Ok(collection(&databases, db, coll)?
            .documents
            .iter()
            .find(|doc| doc.id == id)
            .cloned())
    }

    async fn list_documents(&self, db: &str, coll: &str) -> StoreResult<Vec<Document>> {
        let databases = self.databases.read();
        Ok(collection(&databases, db, coll)?.documents.clone())
    }

    async fn upsert_document(&self, db: &str, coll: &str, document: Document) -> StoreResult<bool> {
        let mut databases = self.databases.write();
        let entry = collection_mut(&mut databases, db, coll)?;
        match entry.documents.iter_mut().find(|doc| doc.id == document.id) {
            Some(existing) => {
                *existing = document;
                Ok(false)
            }
            None => {
                entry.documents.push(document);
                Ok(true)
            }
        }
    }

    async fn insert_document(
        &self,
        db: &str,
        coll: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<Id> {
        let mut databases = self.databases.write();
        let entry = collection_mut(&mut databases, db, coll)?;
        let id = id_from_fields(&fields).unwrap_or_else(generate_id);
        if entry.documents.iter().any(|doc| doc.id == id) {
            return Err(StoreError::Conflict(format!("Document '{}'", id)));
        }
        entry.documents.push(Document::new(id.clone(), fields));
        Ok(id)
    }

    async fn delete_document(&self, db: &str, coll: &str, id: &str) -> StoreResult<bool> {
        let mut databases = self.databases.write();
        let entry = collection_mut(&mut databases, db, coll)?;
        let before = entry.documents.len();
        entry.documents.retain(|doc| doc.id != id);
        Ok(entry.documents.len() != before)
    }
}

#[async_trait::async_trait]
impl FileStore for MemoryStore {
    async fn get_file(&self, db: &str, coll: &str, id: &str) -> StoreResult<Option<StoredFile>> {
        let databases = self.databases.read();
        Ok(collection(&databases, db, coll)?
            .files
            .iter()
            .find(|file| file.id == id)
            .cloned())
    }

    async fn list_files(&self, db: &str, coll: &str) -> StoreResult<Vec<StoredFile>> {
        let databases = self.databases.read();
        Ok(collection(&databases, db, coll)?.files.clone())
    }

    async fn put_file(&self, db: &str, coll: &str, file: StoredFile) -> StoreResult<bool> {
        let mut databases = self.databases.write();
        let entry = collection_mut(&mut databases, db, coll)?;
        match entry.files.iter_mut().find(|existing| existing.id == file.id) {
            Some(existing) => {
                *existing = file;
                Ok(false)
            }
            None => {
                entry.files.push(file);
                Ok(true)
            }
        }
    }

    async fn delete_file(&self, db: &str, coll: &str, id: &str) -> StoreResult<bool> {
        let mut databases = self.databases.write();
        let entry = collection_mut(&mut databases, db, coll)?;
        let before = entry.files.len();
        entry.files.retain(|file| file.id != id);
        Ok(entry.files.len() != before)
    }
}

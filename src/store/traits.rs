use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{Collection, Database, Document, Id, StoredFile};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait::async_trait]
pub trait DatabaseStore: Send + Sync {
    async fn get_database(&self, db: &str) -> StoreResult<Option<Database>>;
    async fn list_databases(&self) -> StoreResult<Vec<Database>>;
    /// Create or replace the property document; returns true when the database was created
    async fn upsert_database(&self, db: &str, props: Map<String, Value>) -> StoreResult<bool>;
    async fn delete_database(&self, db: &str) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait CollectionStore: Send + Sync {
    async fn get_collection(&self, db: &str, coll: &str) -> StoreResult<Option<Collection>>;
    async fn list_collections(&self, db: &str) -> StoreResult<Vec<Collection>>;
    /// Fails with `NotFound` when the database does not exist
    async fn upsert_collection(
        &self,
        db: &str,
        coll: &str,
        props: Map<String, Value>,
    ) -> StoreResult<bool>;
    async fn delete_collection(&self, db: &str, coll: &str) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, db: &str, coll: &str, id: &str) -> StoreResult<Option<Document>>;
    /// Documents in store order
    async fn list_documents(&self, db: &str, coll: &str) -> StoreResult<Vec<Document>>;
    async fn upsert_document(&self, db: &str, coll: &str, document: Document) -> StoreResult<bool>;
    /// Insert a new document; uses `_id` from the body or generates one
    async fn insert_document(
        &self,
        db: &str,
        coll: &str,
        fields: Map<String, Value>,
    ) -> StoreResult<Id>;
    async fn delete_document(&self, db: &str, coll: &str, id: &str) -> StoreResult<bool>;
}

#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    async fn get_file(&self, db: &str, coll: &str, id: &str) -> StoreResult<Option<StoredFile>>;
    async fn list_files(&self, db: &str, coll: &str) -> StoreResult<Vec<StoredFile>>;
    async fn put_file(&self, db: &str, coll: &str, file: StoredFile) -> StoreResult<bool>;
    async fn delete_file(&self, db: &str, coll: &str, id: &str) -> StoreResult<bool>;
}

pub trait Store: DatabaseStore + CollectionStore + DocumentStore + FileStore + Send + Sync {}

impl<T> Store for T where T: DatabaseStore + CollectionStore + DocumentStore + FileStore + Send + Sync {}

use axum::{routing::get, Router};

use crate::api::document_handlers::{
    create_documents, delete_document, get_document, patch_document, put_document,
};
use crate::api::file_handlers::{delete_file, get_file, get_file_binary, put_file};
use crate::api::handlers::{
    delete_collection, delete_database, get_collection, get_database, health_check,
    list_databases, patch_collection, patch_database, put_collection, put_database, SharedState,
};
use crate::store::Store;

pub fn create_router<S: Store + 'static>() -> Router<SharedState<S>> {
    Router::new()
        // Health
        .route("/health", get(health_check))
        // Databases
        .route("/", get(list_databases::<S>))
        .route(
            "/:db",
            get(get_database::<S>)
                .put(put_database::<S>)
                .patch(patch_database::<S>)
                .delete(delete_database::<S>),
        )
        // Collections
        .route(
            "/:db/:coll",
            get(get_collection::<S>)
                .put(put_collection::<S>)
                .patch(patch_collection::<S>)
                .post(create_documents::<S>)
                .delete(delete_collection::<S>),
        )
        // Files
        .route(
            "/:db/:coll/files/:file",
            get(get_file::<S>)
                .put(put_file::<S>)
                .delete(delete_file::<S>),
        )
        .route("/:db/:coll/files/:file/binary", get(get_file_binary::<S>))
        // Documents
        .route(
            "/:db/:coll/:doc",
            get(get_document::<S>)
                .put(put_document::<S>)
                .patch(patch_document::<S>)
                .delete(delete_document::<S>),
        )
}

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use log::info;
use serde_json::Value;

use crate::api::handlers::{
    created_or_ok, load_collection, not_found, respond, store_error, transform_request,
    ApiResult, SharedState,
};
use crate::api::representation::{file_representation, root_object, strip_reserved};
use crate::model::{Exchange, Method, RequestContext, ResourceType, StoredFile};
use crate::store::Store;

/// Upload raw bytes; scripts see and may rewrite the file's metadata, never its content
pub async fn put_file<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
    exchange: Exchange,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let (database, collection) = load_collection(&state, &db, &coll).await?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let file = StoredFile::new(id.clone(), content_type, body.to_vec());

    let mut ctx = RequestContext::new(ResourceType::File, Method::Put, &db)
        .with_collection(&coll)
        .with_resource_id(&id)
        .with_db_props(database.props)
        .with_coll_props(collection.props)
        .with_request_content(file_representation(&file));
    transform_request(&state, &exchange, &mut ctx)?;

    // length always reflects the stored bytes
    let mut metadata = strip_reserved(root_object(ctx.request_content()));
    metadata.insert("length".to_string(), Value::from(file.content.len()));
    let file = StoredFile { metadata, ..file };

    let size = file.content.len();
    let created = state
        .store
        .put_file(&db, &coll, file)
        .await
        .map_err(store_error)?;
    info!("Stored file '{}' ({} bytes) in '{}/{}'", id, size, db, coll);
    Ok(created_or_ok(created))
}

/// File metadata representation, subject to response transformers
pub async fn get_file<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
    exchange: Exchange,
) -> ApiResult<Json<Value>> {
    let (database, collection) = load_collection(&state, &db, &coll).await?;
    let file = state
        .store
        .get_file(&db, &coll, &id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(format!("File '{}'", id)))?;

    let ctx = RequestContext::new(ResourceType::File, Method::Get, &db)
        .with_collection(&coll)
        .with_resource_id(&id)
        .with_db_props(database.props)
        .with_coll_props(collection.props)
        .with_response_content(file_representation(&file));
    respond(&state, &exchange, ctx)
}

/// Raw content, served as stored
pub async fn get_file_binary<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let file = state
        .store
        .get_file(&db, &coll, &id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(format!("File '{}'", id)))?;

    let content_type = file.content_type().to_string();
    Ok(([(header::CONTENT_TYPE, content_type)], file.content).into_response())
}

pub async fn delete_file<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    if state
        .store
        .delete_file(&db, &coll, &id)
        .await
        .map_err(store_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("File '{}'", id)))
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use log::{debug, info};
use serde_json::{json, Value};

use crate::api::handlers::{
    api_error, body_object, created_or_ok, load_collection, not_found, respond, store_error,
    transform_request, ApiResult, SharedState,
};
use crate::api::representation::{document_representation, root_object};
use crate::logic::children_of;
use crate::model::{
    merge_fields, ContentTree, Document, EmbedKind, Exchange, Method, RequestContext, ResourceType,
};
use crate::store::Store;

/// POST a single document or an array of them into a collection
///
/// New documents travel through request-phase dispatch embedded under `rh:doc`, so
/// collection-level CHILDREN transformers run once per document.
pub async fn create_documents<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll)): Path<(String, String)>,
    exchange: Exchange,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let documents = match body {
        Value::Object(fields) => vec![fields],
        Value::Array(items) => items
            .into_iter()
            .map(body_object)
            .collect::<ApiResult<Vec<_>>>()?,
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Request body must be a JSON object or an array of objects",
            ))
        }
    };
    let (database, collection) = load_collection(&state, &db, &coll).await?;

    let mut content = ContentTree::new();
    let root = content.root();
    for fields in documents {
        content.embed(root, EmbedKind::Document, fields);
    }

    let mut ctx = RequestContext::new(ResourceType::Collection, Method::Post, &db)
        .with_collection(&coll)
        .with_db_props(database.props)
        .with_coll_props(collection.props)
        .with_request_content(content);
    transform_request(&state, &exchange, &mut ctx)?;

    let content = ctx.into_request_content();
    let mut inserted = Vec::new();
    for child in children_of(&content, content.root(), EmbedKind::Document) {
        let Value::Object(fields) = content.render(child) else {
            continue;
        };
        let id = state
            .store
            .insert_document(&db, &coll, fields)
            .await
            .map_err(store_error)?;
        debug!("Inserted document '{}' into '{}/{}'", id, db, coll);
        inserted.push(json!({ "_id": id }));
    }

    info!("Inserted {} document(s) into '{}/{}'", inserted.len(), db, coll);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "_embedded": { "rh:doc": inserted } })),
    ))
}

pub async fn get_document<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
    exchange: Exchange,
) -> ApiResult<Json<Value>> {
    let (database, collection) = load_collection(&state, &db, &coll).await?;
    let document = state
        .store
        .get_document(&db, &coll, &id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(format!("Document '{}'", id)))?;

    let ctx = RequestContext::new(ResourceType::Document, Method::Get, &db)
        .with_collection(&coll)
        .with_resource_id(&id)
        .with_db_props(database.props)
        .with_coll_props(collection.props)
        .with_response_content(document_representation(&document));
    respond(&state, &exchange, ctx)
}

pub async fn put_document<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
    exchange: Exchange,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let body = body_object(body)?;
    let (database, collection) = load_collection(&state, &db, &coll).await?;

    let mut ctx = RequestContext::new(ResourceType::Document, Method::Put, &db)
        .with_collection(&coll)
        .with_resource_id(&id)
        .with_db_props(database.props)
        .with_coll_props(collection.props)
        .with_request_content(ContentTree::from_json(body));
    transform_request(&state, &exchange, &mut ctx)?;

    let document = Document::new(id, root_object(ctx.request_content()));
    let created = state
        .store
        .upsert_document(&db, &coll, document)
        .await
        .map_err(store_error)?;
    Ok(created_or_ok(created))
}

pub async fn patch_document<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
    exchange: Exchange,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let body = body_object(body)?;
    let (database, collection) = load_collection(&state, &db, &coll).await?;
    let existing = state
        .store
        .get_document(&db, &coll, &id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(format!("Document '{}'", id)))?;

    let mut ctx = RequestContext::new(ResourceType::Document, Method::Patch, &db)
        .with_collection(&coll)
        .with_resource_id(&id)
        .with_db_props(database.props)
        .with_coll_props(collection.props)
        .with_request_content(ContentTree::from_json(body));
    transform_request(&state, &exchange, &mut ctx)?;

    let mut fields = existing.fields;
    merge_fields(&mut fields, root_object(ctx.request_content()));
    state
        .store
        .upsert_document(&db, &coll, Document::new(id, fields))
        .await
        .map_err(store_error)?;
    Ok(StatusCode::OK)
}

pub async fn delete_document<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll, id)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    if state
        .store
        .delete_document(&db, &coll, &id)
        .await
        .map_err(store_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("Document '{}'", id)))
    }
}

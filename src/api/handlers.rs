use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::api::representation::{
    collection_representation, database_representation, root_object, root_representation,
    strip_reserved,
};
use crate::logic::{DispatchStrategy, TransformerDispatcher};
use crate::model::{
    merge_fields, validate_metadata, Collection, ContentTree, Database, Exchange, Method,
    RequestContext, ResourceType, TransformError,
};
use crate::store::{Store, StoreError};

/// Shared state handed to every handler
pub struct AppState<S> {
    pub store: S,
    pub dispatcher: TransformerDispatcher,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, dispatcher: TransformerDispatcher) -> Self {
        Self { store, dispatcher }
    }
}

pub type SharedState<S> = Arc<AppState<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn api_error(status: StatusCode, message: impl AsRef<str>) -> ApiError {
    (status, Json(ErrorResponse::new(message.as_ref())))
}

pub(crate) fn not_found(what: impl AsRef<str>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("{} not found", what.as_ref()))
}

pub(crate) fn store_error(err: StoreError) -> ApiError {
    let status = match &err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// Bad metadata is the client's fault; a failing script is ours
pub(crate) fn transform_error(err: TransformError) -> ApiError {
    match &err {
        TransformError::InvalidMetadata(_) => api_error(StatusCode::BAD_REQUEST, err.to_string()),
        TransformError::Script(_) => {
            warn!("Transformer failed: {}", err);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

pub(crate) fn body_object(body: Value) -> ApiResult<Map<String, Value>> {
    match body {
        Value::Object(fields) => Ok(fields),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Request body must be a JSON object",
        )),
    }
}

pub(crate) fn created_or_ok(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

/// Run request-phase transformers over the content a client sent
pub(crate) fn transform_request<S: Store>(
    state: &SharedState<S>,
    exchange: &Exchange,
    ctx: &mut RequestContext,
) -> ApiResult<()> {
    state
        .dispatcher
        .apply(&DispatchStrategy::request(), exchange, ctx)
        .map_err(transform_error)?;
    Ok(())
}

/// Run response-phase transformers and serialize what they leave behind
pub(crate) fn respond<S: Store>(
    state: &SharedState<S>,
    exchange: &Exchange,
    mut ctx: RequestContext,
) -> ApiResult<Json<Value>> {
    state
        .dispatcher
        .apply(&DispatchStrategy::response(), exchange, &mut ctx)
        .map_err(transform_error)?;
    Ok(Json(ctx.response_content().to_value()))
}

pub(crate) async fn load_database<S: Store>(state: &SharedState<S>, db: &str) -> ApiResult<Database> {
    state
        .store
        .get_database(db)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(format!("Database '{}'", db)))
}

/// Both owners of a collection-scoped request, so their metadata can be dispatched
pub(crate) async fn load_collection<S: Store>(
    state: &SharedState<S>,
    db: &str,
    coll: &str,
) -> ApiResult<(Database, Collection)> {
    let database = load_database(state, db).await?;
    let collection = state
        .store
        .get_collection(db, coll)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found(format!("Collection '{}/{}'", db, coll)))?;
    Ok((database, collection))
}

/// Properties to persist from a transformed request body; `rts` must still parse
fn validated_props(tree: &ContentTree) -> ApiResult<Map<String, Value>> {
    let props = strip_reserved(root_object(tree));
    validate_metadata(&props).map_err(transform_error)?;
    Ok(props)
}

pub async fn list_databases<S: Store>(
    State(state): State<SharedState<S>>,
) -> ApiResult<Json<Value>> {
    let databases = state.store.list_databases().await.map_err(store_error)?;
    Ok(Json(root_representation(&databases).to_value()))
}

pub async fn get_database<S: Store>(
    State(state): State<SharedState<S>>,
    Path(db): Path<String>,
    exchange: Exchange,
) -> ApiResult<Json<Value>> {
    let database = load_database(&state, &db).await?;
    let collections = state
        .store
        .list_collections(&db)
        .await
        .map_err(store_error)?;

    let ctx = RequestContext::new(ResourceType::Database, Method::Get, &db)
        .with_db_props(database.props.clone())
        .with_response_content(database_representation(&database, &collections));
    respond(&state, &exchange, ctx)
}

pub async fn put_database<S: Store>(
    State(state): State<SharedState<S>>,
    Path(db): Path<String>,
    exchange: Exchange,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let body = body_object(body)?;
    let existing = state.store.get_database(&db).await.map_err(store_error)?;

    let mut ctx = RequestContext::new(ResourceType::Database, Method::Put, &db)
        .with_db_props(existing.map(|d| d.props).unwrap_or_default())
        .with_request_content(ContentTree::from_json(body));
    transform_request(&state, &exchange, &mut ctx)?;

    let props = validated_props(ctx.request_content())?;
    let created = state
        .store
        .upsert_database(&db, props)
        .await
        .map_err(store_error)?;
    info!("{} database '{}'", if created { "Created" } else { "Replaced" }, db);
    Ok(created_or_ok(created))
}

pub async fn patch_database<S: Store>(
    State(state): State<SharedState<S>>,
    Path(db): Path<String>,
    exchange: Exchange,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let body = body_object(body)?;
    let database = load_database(&state, &db).await?;

    let mut ctx = RequestContext::new(ResourceType::Database, Method::Patch, &db)
        .with_db_props(database.props.clone())
        .with_request_content(ContentTree::from_json(body));
    transform_request(&state, &exchange, &mut ctx)?;

    let mut props = database.props;
    merge_fields(&mut props, strip_reserved(root_object(ctx.request_content())));
    validate_metadata(&props).map_err(transform_error)?;

    state
        .store
        .upsert_database(&db, props)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::OK)
}

pub async fn delete_database<S: Store>(
    State(state): State<SharedState<S>>,
    Path(db): Path<String>,
) -> ApiResult<StatusCode> {
    if state.store.delete_database(&db).await.map_err(store_error)? {
        info!("Deleted database '{}'", db);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("Database '{}'", db)))
    }
}

pub async fn get_collection<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll)): Path<(String, String)>,
    exchange: Exchange,
) -> ApiResult<Json<Value>> {
    let (database, collection) = load_collection(&state, &db, &coll).await?;
    let documents = state
        .store
        .list_documents(&db, &coll)
        .await
        .map_err(store_error)?;
    let files = state
        .store
        .list_files(&db, &coll)
        .await
        .map_err(store_error)?;

    let ctx = RequestContext::new(ResourceType::Collection, Method::Get, &db)
        .with_collection(&coll)
        .with_db_props(database.props)
        .with_coll_props(collection.props.clone())
        .with_response_content(collection_representation(&collection, &documents, &files));
    respond(&state, &exchange, ctx)
}

pub async fn put_collection<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll)): Path<(String, String)>,
    exchange: Exchange,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let body = body_object(body)?;
    let database = load_database(&state, &db).await?;
    let existing = state
        .store
        .get_collection(&db, &coll)
        .await
        .map_err(store_error)?;

    let mut ctx = RequestContext::new(ResourceType::Collection, Method::Put, &db)
        .with_collection(&coll)
        .with_db_props(database.props)
        .with_coll_props(existing.map(|c| c.props).unwrap_or_default())
        .with_request_content(ContentTree::from_json(body));
    transform_request(&state, &exchange, &mut ctx)?;

    let props = validated_props(ctx.request_content())?;
    let created = state
        .store
        .upsert_collection(&db, &coll, props)
        .await
        .map_err(store_error)?;
    info!(
        "{} collection '{}/{}'",
        if created { "Created" } else { "Replaced" },
        db,
        coll
    );
    Ok(created_or_ok(created))
}

pub async fn patch_collection<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll)): Path<(String, String)>,
    exchange: Exchange,
    Json(body): Json<Value>,
) -> ApiResult<StatusCode> {
    let body = body_object(body)?;
    let (database, collection) = load_collection(&state, &db, &coll).await?;

    let mut ctx = RequestContext::new(ResourceType::Collection, Method::Patch, &db)
        .with_collection(&coll)
        .with_db_props(database.props)
        .with_coll_props(collection.props.clone())
        .with_request_content(ContentTree::from_json(body));
    transform_request(&state, &exchange, &mut ctx)?;

    let mut props = collection.props;
    merge_fields(&mut props, strip_reserved(root_object(ctx.request_content())));
    validate_metadata(&props).map_err(transform_error)?;

    state
        .store
        .upsert_collection(&db, &coll, props)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::OK)
}

pub async fn delete_collection<S: Store>(
    State(state): State<SharedState<S>>,
    Path((db, coll)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    if state
        .store
        .delete_collection(&db, &coll)
        .await
        .map_err(store_error)?
    {
        info!("Deleted collection '{}/{}'", db, coll);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("Collection '{}/{}'", db, coll)))
    }
}

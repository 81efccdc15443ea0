//! In-memory stand-in for the Prismic Custom Types API.
//!
//! Serves the custom type and shared slice CRUD routes and the two changeset
//! endpoints for a single repository. Models are stored as raw JSON keyed by
//! their `id`; nothing is validated beyond the presence of an id.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

pub const DEFAULT_COMMAND_LIMIT: usize = 50;

/// Credentials and limits of the mocked repository.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub repository_name: String,
    pub token: String,
    /// Largest changeset accepted by the bulk endpoints.
    pub command_limit: usize,
}

impl MockConfig {
    pub fn new(repository_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            repository_name: repository_name.into(),
            token: token.into(),
            command_limit: DEFAULT_COMMAND_LIMIT,
        }
    }

    pub fn with_command_limit(mut self, command_limit: usize) -> Self {
        self.command_limit = command_limit;
        self
    }
}

/// Stored models plus the number of documents using each custom type.
#[derive(Clone, Debug, Default)]
pub struct Repository {
    pub custom_types: BTreeMap<String, Value>,
    pub slices: BTreeMap<String, Value>,
    pub documents: BTreeMap<String, usize>,
}

impl Repository {
    pub fn with_custom_type(mut self, model: Value) -> Self {
        if let Some(id) = model_id(&model) {
            self.custom_types.insert(id, model);
        }
        self
    }

    pub fn with_slice(mut self, model: Value) -> Self {
        if let Some(id) = model_id(&model) {
            self.slices.insert(id, model);
        }
        self
    }

    /// Pretend `count` documents use custom type `id`.
    pub fn with_documents(mut self, id: impl Into<String>, count: usize) -> Self {
        self.documents.insert(id.into(), count);
        self
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<MockConfig>,
    repository: Arc<RwLock<Repository>>,
}

pub fn app(config: MockConfig) -> Router {
    app_with_repository(config, Repository::default())
}

pub fn app_with_repository(config: MockConfig, repository: Repository) -> Router {
    let state = AppState {
        config: Arc::new(config),
        repository: Arc::new(RwLock::new(repository)),
    };
    Router::new()
        .route("/customtypes", get(list_custom_types))
        .route("/customtypes/insert", post(insert_custom_type))
        .route("/customtypes/update", post(update_custom_type))
        .route(
            "/customtypes/{id}",
            get(get_custom_type).delete(delete_custom_type),
        )
        .route("/slices", get(list_slices))
        .route("/slices/insert", post(insert_slice))
        .route("/slices/update", post(update_slice))
        .route("/slices/{id}", get(get_slice).delete(delete_slice))
        .route("/bulk", post(bulk))
        .route("/bulk-update", post(bulk_update))
        .layer(middleware::from_fn_with_state(state.clone(), authorize))
        .with_state(state)
}

pub async fn run(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    run_with_repository(listener, config, Repository::default()).await
}

pub async fn run_with_repository(
    listener: TcpListener,
    config: MockConfig,
    repository: Repository,
) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, repository = %config.repository_name, "mock custom types API listening");
    }
    axum::serve(listener, app_with_repository(config, repository)).await
}

/// 401 without a bearer token, 403 when the token or repository is wrong.
async fn authorize(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let headers = request.headers();
    let Some(token) = bearer_token(headers) else {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    };
    let repository = headers
        .get("repository")
        .and_then(|value| value.to_str().ok());
    if token != state.config.token || repository != Some(state.config.repository_name.as_str()) {
        debug!(path = %request.uri().path(), "rejecting request with wrong credentials");
        return forbidden("[MOCK FORBIDDEN ERROR]");
    }
    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "message": message }))).into_response()
}

fn model_id(model: &Value) -> Option<String> {
    model.get("id")?.as_str().map(str::to_string)
}

#[derive(Clone, Copy)]
enum Collection {
    CustomTypes,
    Slices,
}

impl Repository {
    fn collection(&self, collection: Collection) -> &BTreeMap<String, Value> {
        match collection {
            Collection::CustomTypes => &self.custom_types,
            Collection::Slices => &self.slices,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut BTreeMap<String, Value> {
        match collection {
            Collection::CustomTypes => &mut self.custom_types,
            Collection::Slices => &mut self.slices,
        }
    }

    fn insert(&mut self, collection: Collection, model: Value) -> Result<(), StatusCode> {
        let id = model_id(&model).ok_or(StatusCode::BAD_REQUEST)?;
        let models = self.collection_mut(collection);
        if models.contains_key(&id) {
            return Err(StatusCode::CONFLICT);
        }
        models.insert(id, model);
        Ok(())
    }

    fn update(&mut self, collection: Collection, model: Value) -> Result<(), StatusCode> {
        let id = model_id(&model).ok_or(StatusCode::BAD_REQUEST)?;
        let existing = self
            .collection_mut(collection)
            .get_mut(&id)
            .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
        *existing = model;
        Ok(())
    }

    fn remove(&mut self, collection: Collection, id: &str) -> Option<Value> {
        let removed = self.collection_mut(collection).remove(id);
        if removed.is_some() {
            if let Collection::CustomTypes = collection {
                self.documents.remove(id);
            }
        }
        removed
    }
}

// --- custom types ---

async fn list_custom_types(State(state): State<AppState>) -> Json<Vec<Value>> {
    list(&state, Collection::CustomTypes).await
}

async fn get_custom_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    find(&state, Collection::CustomTypes, &id).await
}

async fn insert_custom_type(
    State(state): State<AppState>,
    Json(model): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    state.repository.write().await.insert(Collection::CustomTypes, model)?;
    Ok(StatusCode::CREATED)
}

async fn update_custom_type(
    State(state): State<AppState>,
    Json(model): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    state.repository.write().await.update(Collection::CustomTypes, model)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_custom_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    remove(&state, Collection::CustomTypes, &id).await
}

// --- shared slices ---

async fn list_slices(State(state): State<AppState>) -> Json<Vec<Value>> {
    list(&state, Collection::Slices).await
}

async fn get_slice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    find(&state, Collection::Slices, &id).await
}

async fn insert_slice(
    State(state): State<AppState>,
    Json(model): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    state.repository.write().await.insert(Collection::Slices, model)?;
    Ok(StatusCode::CREATED)
}

async fn update_slice(
    State(state): State<AppState>,
    Json(model): Json<Value>,
) -> Result<StatusCode, StatusCode> {
    state.repository.write().await.update(Collection::Slices, model)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_slice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    remove(&state, Collection::Slices, &id).await
}

async fn list(state: &AppState, collection: Collection) -> Json<Vec<Value>> {
    let repository = state.repository.read().await;
    Json(repository.collection(collection).values().cloned().collect())
}

async fn find(state: &AppState, collection: Collection, id: &str) -> Result<Json<Value>, StatusCode> {
    let repository = state.repository.read().await;
    repository
        .collection(collection)
        .get(id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn remove(state: &AppState, collection: Collection, id: &str) -> Result<StatusCode, StatusCode> {
    let mut repository = state.repository.write().await;
    repository
        .remove(collection, id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}

// --- changesets ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    #[serde(default)]
    pub confirm_delete_documents: bool,
    pub changes: Vec<ChangeRequest>,
}

#[derive(Deserialize)]
pub struct ChangeRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub payload: Value,
}

async fn bulk(State(state): State<AppState>, Json(request): Json<BulkRequest>) -> Response {
    apply_changes(&state, request, true).await
}

async fn bulk_update(State(state): State<AppState>, Json(request): Json<BulkRequest>) -> Response {
    apply_changes(&state, request, false).await
}

/// Validate the whole changeset, then apply it to a copy of the repository
/// that replaces the original only if every change succeeds.
async fn apply_changes(state: &AppState, request: BulkRequest, confirm_deletions: bool) -> Response {
    let limit = state.config.command_limit;
    if request.changes.len() > limit {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "message": format!("a changeset may contain at most {limit} commands"),
                "details": { "limit": limit, "commands": request.changes.len() },
            })),
        )
            .into_response();
    }

    let mut repository = state.repository.write().await;

    if confirm_deletions && !request.confirm_delete_documents {
        let affected: Vec<Value> = request
            .changes
            .iter()
            .filter(|change| change.kind == "CUSTOM_TYPE_DELETE")
            .filter_map(|change| {
                let count = *repository.documents.get(&change.id)?;
                (count > 0).then(|| json!({ "id": change.id, "numberOfDocuments": count }))
            })
            .collect();
        if !affected.is_empty() {
            return (
                StatusCode::ACCEPTED,
                Json(json!({ "details": { "customTypes": affected } })),
            )
                .into_response();
        }
    }

    let mut staged = repository.clone();
    for change in request.changes {
        if let Err(status) = apply_change(&mut staged, change) {
            return status.into_response();
        }
    }
    *repository = staged;
    StatusCode::NO_CONTENT.into_response()
}

fn apply_change(repository: &mut Repository, change: ChangeRequest) -> Result<(), StatusCode> {
    if model_id(&change.payload).as_deref() != Some(change.id.as_str()) {
        return Err(StatusCode::BAD_REQUEST);
    }
    match change.kind.as_str() {
        "CUSTOM_TYPE_INSERT" => repository.insert(Collection::CustomTypes, change.payload),
        "CUSTOM_TYPE_UPDATE" => repository.update(Collection::CustomTypes, change.payload),
        "CUSTOM_TYPE_DELETE" => repository
            .remove(Collection::CustomTypes, &change.id)
            .map(|_| ())
            .ok_or(StatusCode::UNPROCESSABLE_ENTITY),
        "SLICE_INSERT" => repository.insert(Collection::Slices, change.payload),
        "SLICE_UPDATE" => repository.update(Collection::Slices, change.payload),
        "SLICE_DELETE" => repository
            .remove(Collection::Slices, &change.id)
            .map(|_| ())
            .ok_or(StatusCode::UNPROCESSABLE_ENTITY),
        _ => Err(StatusCode::BAD_REQUEST),
    }
}

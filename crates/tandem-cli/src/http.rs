//! HTTP surface: answers, health, and record CRUD forwarded to the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tandem_core::{Error, ErrorKind, Scalar, SharedHandle, SourceRecord};
use tandem_rag::{Answer, AnswerComposer};
use tandem_sync::{PrimaryStore, WatcherSnapshot, WatcherStats};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// Answers `/ask`.
    pub composer: Arc<AnswerComposer>,
    /// Primary store for the record routes.
    pub store: SharedHandle<dyn PrimaryStore>,
    /// Watcher counters, when a watcher is running.
    pub watcher: Option<Arc<WatcherStats>>,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .route("/records", get(list_records).post(create_record))
        .route(
            "/records/{id}",
            get(get_record).patch(update_record).delete(delete_record),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
struct CreateRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    fields: BTreeMap<String, Scalar>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    store_open: bool,
    cache_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    watcher: Option<WatcherSnapshot>,
}

#[derive(Debug, Serialize)]
struct DeleteBody {
    id: String,
    deleted: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// A [`tandem_core::Error`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Closed(_) => StatusCode::SERVICE_UNAVAILABLE,
            err if err.kind() == ErrorKind::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<Json<Answer>> {
    Ok(Json(state.composer.answer(&request.query).await?))
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        store_open: state.store.is_open(),
        cache_entries: state.composer.cache().len(),
        watcher: state.watcher.as_ref().map(|stats| stats.snapshot()),
    })
}

async fn list_records(State(state): State<AppState>) -> ApiResult<Json<Vec<SourceRecord>>> {
    Ok(Json(state.store.get().await?.list().await?))
}

async fn create_record(
    State(state): State<AppState>,
    Json(request): Json<CreateRecord>,
) -> ApiResult<(StatusCode, Json<SourceRecord>)> {
    let record = state
        .store
        .get()
        .await?
        .insert(request.id, request.fields)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SourceRecord>> {
    state
        .store
        .get()
        .await?
        .fetch(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(Error::not_found(format!("record '{id}'"))))
}

async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<BTreeMap<String, Scalar>>,
) -> ApiResult<Json<SourceRecord>> {
    Ok(Json(state.store.get().await?.update(&id, patch).await?))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteBody>> {
    let deleted = state.store.get().await?.delete(&id).await?;
    Ok(Json(DeleteBody { id, deleted }))
}

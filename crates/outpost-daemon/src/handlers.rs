// SPDX-License-Identifier: MIT

//! Request surface: mechanical JSON-in/JSON-out adapters over the
//! registry. No lifecycle logic lives here.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use outpost_engine::{CreateSpec, LogEvent, Registry, RegistryError};
use outpost_core::SystemClock;
use outpost_wire::{
    ApiError, ApiErrorKind, CreateProcessRequest, DeleteResponse, IndexDocument,
    ListProcessesResponse, ProcessSnapshotDocument,
};

use crate::state::AppState;

/// Wraps [`ApiError`] so this crate can implement [`IntoResponse`] for it
/// (both the trait and `ApiError` live in other crates).
pub struct AppError(ApiError);

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ApiErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorKind::SlugInUse => StatusCode::CONFLICT,
            ApiErrorKind::NotFound => StatusCode::NOT_FOUND,
        };
        (status, Json(self.0)).into_response()
    }
}

fn base_url(headers: &HeaderMap) -> String {
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok()).unwrap_or("localhost");
    format!("http://{host}")
}

pub async fn index(headers: HeaderMap) -> Json<IndexDocument> {
    let base = base_url(&headers);
    Json(IndexDocument { list: format!("{base}/list-processes"), create: format!("{base}/create-process") })
}

pub async fn list_processes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ListProcessesResponse> {
    let base = base_url(&headers);
    let processes = state
        .registry
        .list()
        .iter()
        .map(|snapshot| ProcessSnapshotDocument::from_snapshot(snapshot, &base))
        .collect();
    Json(ListProcessesResponse { processes })
}

pub async fn create_process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateProcessRequest>,
) -> Result<(StatusCode, Json<ProcessSnapshotDocument>), AppError> {
    request.validate()?;
    let base = base_url(&headers);
    let slug = format!("{}.{}", request.app, request.node);

    let snapshot = state
        .registry
        .create(CreateSpec {
            app: request.app,
            node: request.node,
            process_type: request.process_type,
            source_url: request.source_url,
            env: request.env,
        })
        .map_err(|e| match e {
            RegistryError::SlugInUse => ApiError::slug_in_use(&slug),
            RegistryError::InvalidRequest(detail) => ApiError::invalid_request(detail),
            RegistryError::NotFound => {
                unreachable!("create never returns not-found")
            }
        })?;

    Ok((StatusCode::CREATED, Json(ProcessSnapshotDocument::from_snapshot(&snapshot, &base))))
}

pub async fn process_status(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProcessSnapshotDocument>, AppError> {
    let base = base_url(&headers);
    let snapshot = state.registry.get(&slug).ok_or_else(|| ApiError::not_found(&slug))?;
    Ok(Json(ProcessSnapshotDocument::from_snapshot(&snapshot, &base)))
}

pub async fn delete_process(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.registry.delete(&slug).await.map_err(|_| ApiError::not_found(&slug))?;
    Ok(Json(DeleteResponse::default()))
}

pub async fn attach_console(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    if state.registry.get(&slug).is_none() {
        return Err(ApiError::not_found(&slug).into());
    }
    let registry = state.registry.clone();
    Ok(ws.on_upgrade(move |socket| handle_console_socket(socket, registry, slug)))
}

async fn handle_console_socket(mut socket: WebSocket, registry: Registry<SystemClock>, slug: String) {
    let Ok(mut subscriber) = registry.subscribe(&slug) else {
        let _ = socket.close().await;
        return;
    };

    while let Some(event) = subscriber.next().await {
        let text = match event {
            LogEvent::Line { line, .. } => line,
            LogEvent::Gap { dropped } => format!("-- gap: {dropped} lines dropped --"),
        };
        if socket.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    let _ = socket.close().await;
}

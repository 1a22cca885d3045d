use axum::{
    Json, Router,
    extract::{Path, Query, State as AxumState, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::{ApiResult, DispatchServer};
use crate::lib::dispatch::{entry::DispatchEntry, types::DispatchRequest};
use crate::lib::tasks::types::{EcsTaskStateChange, ScanTask, StatusReport, TaskFilter};

impl DispatchServer {
    pub fn new(entry: DispatchEntry, address: &str) -> Self {
        Self {
            entry,
            address: address.to_string(),
        }
    }

    async fn dispatch(
        AxumState(server): AxumState<Arc<DispatchServer>>,
        payload: Result<Json<DispatchRequest>, JsonRejection>,
    ) -> ApiResult<impl IntoResponse> {
        let Json(request) = payload
            .inspect_err(|e| tracing::warn!(error = %e, "Malformed dispatch request"))?;
        let report = server
            .entry
            .handle(request)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Dispatch failed"))?;
        Ok((StatusCode::ACCEPTED, Json(report)))
    }

    async fn list_tasks(
        AxumState(server): AxumState<Arc<DispatchServer>>,
        Query(filter): Query<TaskFilter>,
    ) -> ApiResult<Json<Vec<ScanTask>>> {
        let tasks = server.entry.dispatcher().tracker().list(&filter).await?;
        Ok(Json(tasks))
    }

    async fn get_task(
        AxumState(server): AxumState<Arc<DispatchServer>>,
        Path(id): Path<Uuid>,
    ) -> ApiResult<Json<ScanTask>> {
        Ok(Json(server.entry.dispatcher().tracker().get(id).await?))
    }

    async fn kill_task(
        AxumState(server): AxumState<Arc<DispatchServer>>,
        Path(id): Path<Uuid>,
    ) -> ApiResult<Json<ScanTask>> {
        Ok(Json(server.entry.dispatcher().tracker().kill(id).await?))
    }

    async fn report_status(
        AxumState(server): AxumState<Arc<DispatchServer>>,
        Path(id): Path<Uuid>,
        Json(report): Json<StatusReport>,
    ) -> ApiResult<Json<ScanTask>> {
        let task = server
            .entry
            .dispatcher()
            .tracker()
            .report(id, report)
            .await
            .inspect_err(|e| {
                tracing::warn!(task_id = %id, error = %e, "Status report rejected")
            })?;
        Ok(Json(task))
    }

    async fn ecs_event(
        AxumState(server): AxumState<Arc<DispatchServer>>,
        Json(event): Json<EcsTaskStateChange>,
    ) -> ApiResult<impl IntoResponse> {
        let tracker = server.entry.dispatcher().tracker();
        Ok(match tracker.apply_ecs_event(&event).await? {
            Some(task) => (StatusCode::OK, Json(Some(task))),
            None => (StatusCode::ACCEPTED, Json(None)),
        })
    }

    async fn health() -> &'static str {
        "ok"
    }

    pub fn router(self) -> Router {
        let shared = Arc::new(self);

        Router::new()
            .route("/health", get(DispatchServer::health))
            .route("/dispatch", post(DispatchServer::dispatch))
            .route("/scan-tasks", get(DispatchServer::list_tasks))
            .route("/scan-tasks/{id}", get(DispatchServer::get_task))
            .route("/scan-tasks/{id}/kill", post(DispatchServer::kill_task))
            .route("/scan-tasks/{id}/status", post(DispatchServer::report_status))
            .route("/events/ecs", post(DispatchServer::ecs_event))
            .with_state(shared)
            .layer(TraceLayer::new_for_http())
    }

    pub async fn start_server(self) -> std::io::Result<()> {
        let address = self.address.clone();
        let app = self.router();

        let listener = TcpListener::bind(&address).await?;
        tracing::info!(%address, "Dispatch server listening");

        axum::serve(listener, app).await
    }
}

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::lib::dispatch::{entry::DispatchEntry, types::DispatchError};
use crate::lib::tasks::types::TaskError;

pub struct DispatchServer {
    pub entry: DispatchEntry,
    pub address: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Invalid dispatch request: {0}")]
    InvalidRequest(#[from] JsonRejection),
}

fn failure_body(kind: &str, message: String, launched: usize) -> Response {
    let body = json!({
        "statusCode": 500,
        "body": {
            "kind": kind,
            "message": message,
            "launched": launched,
        }
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Dispatch(err) => failure_body(err.kind(), err.to_string(), err.launched()),
            ApiError::InvalidRequest(rejection) => {
                failure_body("invalid_request", rejection.body_text(), 0)
            }
            ApiError::Task(err) => {
                let status = match &err {
                    TaskError::NotFound(_) => StatusCode::NOT_FOUND,
                    TaskError::AlreadyTerminal(_) | TaskError::InvalidTransition { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    TaskError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, Json(json!({ "error": err.to_string() }))).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

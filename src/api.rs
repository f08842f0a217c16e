// src/api.rs
//! HTTP surface: `POST /api/v1/paymaster/process` and `GET /health`.
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use crate::paymaster::{Paymaster, MODULE_NAME, SERVICE_NAME, SERVICE_VERSION};
use crate::types::{ErrorBody, ErrorResponse, ProcessRequest, ProcessResponse, ProcessingInfo, ProcessingResult};

pub const PROCESS_PATH: &str = "/api/v1/paymaster/process";

pub fn routes(paymaster: Arc<Paymaster>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route(PROCESS_PATH, post(post_process))
        .fallback(not_found)
        .with_state(paymaster)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86400))
}

/// `GET /health`
async fn get_health(State(paymaster): State<Arc<Paymaster>>) -> impl IntoResponse {
    Json(paymaster.health())
}

fn processing_info(started: Instant) -> ProcessingInfo {
    ProcessingInfo {
        modules: vec![MODULE_NAME.to_string()],
        total_duration: format!("{}ms", started.elapsed().as_millis()),
        service: format!("{SERVICE_NAME} v{SERVICE_VERSION}"),
    }
}

fn invalid_request(message: impl Into<String>) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorBody {
            code: "INVALID_REQUEST".to_string(),
            message: message.into(),
        },
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// `POST /api/v1/paymaster/process`: sponsors or passes through one operation.
async fn post_process(
    State(paymaster): State<Arc<Paymaster>>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Rejected malformed request body: {}", rejection);
            return invalid_request("Invalid request body");
        }
    };
    let user_operation = match request.user_operation {
        Some(op) if op.is_object() => op,
        _ => return invalid_request("Invalid userOperation format"),
    };

    let started = Instant::now();
    let (status, result) = match paymaster
        .process(&user_operation, request.entry_point_version.as_deref())
        .await
    {
        Ok(result) => (StatusCode::OK, result),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, ProcessingResult::failed(user_operation, &e))
        }
    };
    debug!("Processed request with status {}", status);

    let response = ProcessResponse {
        result,
        processing: processing_info(started),
    };
    (status, Json(response)).into_response()
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

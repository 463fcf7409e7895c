// src/server.rs

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::core::errors::ScanError;
use crate::core::models::{DnsScanRequest, ErrorResponse, WebScanRequest};
use crate::core::scanner::context::CancelToken;
use crate::core::service::ScanService;

pub fn router(service: Arc<ScanService>) -> Router {
    Router::new()
        .route("/web-scanner", post(web_scanner))
        .route("/dns-analyzer", post(dns_analyzer))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

pub async fn serve(listener: TcpListener, service: Arc<ScanService>) -> std::io::Result<()> {
    info!(address = ?listener.local_addr().ok(), "Scanner API listening.");
    axum::serve(listener, router(service)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn web_scanner(
    State(service): State<Arc<ScanService>>,
    payload: Result<Json<WebScanRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection),
    };
    let cancel = CancelToken::new();
    let guard = cancel.drop_guard();
    let outcome = service.web_scan(&request, &cancel).await;
    guard.disarm();
    match outcome {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn dns_analyzer(
    State(service): State<Arc<ScanService>>,
    payload: Result<Json<DnsScanRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection),
    };
    let cancel = CancelToken::new();
    let guard = cancel.drop_guard();
    let outcome = service.dns_scan(&request, &cancel).await;
    guard.disarm();
    match outcome {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

fn bad_request(rejection: JsonRejection) -> Response {
    warn!(error = %rejection, "Rejected request body.");
    let body = ErrorResponse { success: false, error: format!("Invalid request body: {}", rejection.body_text()) };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Only validation errors reach the client verbatim.
pub fn error_response(error: ScanError) -> Response {
    let (status, message) = match &error {
        ScanError::InvalidInput(message) => (StatusCode::BAD_REQUEST, message.clone()),
        ScanError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "Scan cancelled".to_string()),
        _ => {
            error!(error = %error, "Scan request failed.");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
        }
    };
    (status, Json(ErrorResponse { success: false, error: message })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let status = |e| error_response(e).status();
        assert_eq!(status(ScanError::InvalidInput("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(ScanError::Cancelled), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(ScanError::Internal("db".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status(ScanError::DeadlineExceeded), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! HTTP request handlers

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use posw_common::config::{ConnectionConfig, ScanningConfig};
use posw_common::gs1::{self, Gs1Fields};
use posw_common::scan::ScanResult;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::AppState;
use crate::error::Error;
use crate::session::SessionStatus;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    status: String,
    message: String,
}

/// Optional overrides for `POST /scanner/connect`
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    connection: Option<ConnectionConfig>,
    #[serde(default)]
    scanning: Option<ScanningConfig>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    count: usize,
    results: Vec<ScanResult>,
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    payload: String,
}

#[derive(Debug, Serialize)]
pub struct DecodeResponse {
    fields: Gs1Fields,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Error response for API handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::InvalidState { .. } => StatusCode::CONFLICT,
            Error::Config(_) | Error::Common(_) => StatusCode::BAD_REQUEST,
            Error::Transport(_) | Error::Timeout(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", e);
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                status: "error".to_string(),
                message: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============================================================================
// Session Endpoints
// ============================================================================

/// GET /api/v1/scanner/status
pub async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.session.status().await)
}

/// POST /api/v1/scanner/connect
///
/// An empty body connects with the configured defaults; a JSON body may
/// override the `connection` and `scanning` sections.
pub async fn connect(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<SessionStatus>> {
    let request: ConnectRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConnectRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            warn!("Rejected connect request: {}", e);
            ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid connect request: {}", e))
        })?
    };

    let mut config = state.scanner_config.clone();
    if let Some(connection) = request.connection {
        config.connection = connection;
    }
    if let Some(scanning) = request.scanning {
        config.scanning = scanning;
    }

    info!("API connect: {} {}", config.connection.kind, config.connection.device_id);
    state.session.connect(config).await?;
    Ok(Json(state.session.status().await))
}

/// POST /api/v1/scanner/disconnect
pub async fn disconnect(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.session.disconnect().await?;
    Ok(ok())
}

/// POST /api/v1/scanner/start
pub async fn start_scanning(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.session.start_scanning().await?;
    Ok(ok())
}

/// POST /api/v1/scanner/stop
pub async fn stop_scanning(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    state.session.stop_scanning().await?;
    Ok(ok())
}

/// POST /api/v1/scanner/scan
///
/// 200 with the result, or 204 when nothing was read (or the payload was
/// filtered or repeated).
pub async fn scan_single(State(state): State<AppState>) -> ApiResult<Response> {
    match state.session.scan_single().await? {
        Some(result) => Ok(Json(result).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

// ============================================================================
// Result Endpoints
// ============================================================================

/// GET /api/v1/scanner/last
pub async fn get_last_result(State(state): State<AppState>) -> ApiResult<Json<ScanResult>> {
    state
        .session
        .last_result()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No scan recorded yet"))
}

/// GET /api/v1/scanner/history
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let results = state.session.history().await;
    Json(HistoryResponse {
        count: results.len(),
        results,
    })
}

/// DELETE /api/v1/scanner/history
pub async fn clear_history(State(state): State<AppState>) -> Json<StatusResponse> {
    state.session.clear_history().await;
    ok()
}

// ============================================================================
// GS1 Decoder
// ============================================================================

/// POST /api/v1/gs1/decode
pub async fn decode_gs1(Json(request): Json<DecodeRequest>) -> ApiResult<Json<DecodeResponse>> {
    let fields = gs1::decode(&request.payload).ok_or_else(|| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Payload does not carry a GS1 (01) GTIN",
        )
    })?;
    let price = fields.price();
    Ok(Json(DecodeResponse { fields, price }))
}

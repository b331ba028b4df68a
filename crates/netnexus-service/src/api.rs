//! REST API endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info};

use netnexus_core::{ConnectedDevice, WifiError, connect_network};
use netnexus_types::{DeviceSummary, SavedDevice, WifiConnection, WifiNetwork};

use crate::state::AppState;

/// Set to `true` on scan responses cut short by a stop or a connect.
pub const SCAN_INTERRUPTED_HEADER: HeaderName = HeaderName::from_static("x-scan-interrupted");

const DEVICE_NOT_FOUND: &str =
    "Device not found. Please ensure it is nearby and discoverable, then refresh the list.";
const ADDRESS_REQUIRED: &str = "Device address is required.";

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        // Wi-Fi
        .route("/api/wifi", get(wifi_networks))
        .route("/api/current-connection", get(wifi_current_connection))
        .route("/api/connect", post(wifi_connect))
        .route("/api/disconnect", post(wifi_disconnect))
        // Bluetooth
        .route("/api/bluetooth-devices", get(bluetooth_devices))
        .route("/api/bluetooth-connect", post(bluetooth_connect))
        .route("/api/bluetooth-disconnect", post(bluetooth_disconnect))
        .route("/api/bluetooth-save", post(bluetooth_save))
        .route("/api/bluetooth-scan/stop", post(bluetooth_scan_stop))
        .route(
            "/api/bluetooth-previous-devices",
            get(bluetooth_previous_devices),
        )
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Whether a Bluetooth scan currently holds the radio.
    pub scanning: bool,
    /// Devices found by the most recent scan.
    pub cached_devices: usize,
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        scanning: state.bluetooth.is_scanning(),
        cached_devices: state.bluetooth.cached_devices().len(),
    })
}

/// Plain confirmation body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

// ==========================================================================
// Wi-Fi
// ==========================================================================

async fn wifi_networks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WifiNetwork>>, AppError> {
    let networks = state
        .wifi
        .scan()
        .await
        .map_err(|e| AppError::wifi(e, "Failed to scan for Wi-Fi networks"))?;
    Ok(Json(networks))
}

async fn wifi_current_connection(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WifiConnection>>, AppError> {
    let connections = state
        .wifi
        .current_connections()
        .await
        .map_err(|e| AppError::wifi(e, "Failed to get current Wi-Fi connection"))?;
    Ok(Json(connections))
}

/// Wi-Fi connect request body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WifiConnectRequest {
    pub ssid: Option<String>,
    pub password: Option<String>,
}

async fn wifi_connect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WifiConnectRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let ssid = required(request.ssid)
        .ok_or_else(|| AppError::BadRequest("SSID is required".to_string()))?;
    let password = request.password.as_deref().filter(|p| !p.is_empty());

    connect_network(state.wifi.as_ref(), &ssid, password)
        .await
        .map_err(|e| AppError::wifi(e, format!("Failed to connect to {}", ssid)))?;

    info!("Initiated Wi-Fi connection to {}", ssid);
    Ok(MessageResponse::new(format!(
        "Successfully initiated connection to {}",
        ssid
    )))
}

async fn wifi_disconnect(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .wifi
        .disconnect()
        .await
        .map_err(|e| AppError::wifi(e, "Failed to disconnect."))?;
    Ok(MessageResponse::new(
        "Successfully disconnected from the Wi-Fi network.",
    ))
}

// ==========================================================================
// Bluetooth
// ==========================================================================

/// Query parameters for a general scan.
#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    /// Scan window in seconds, capped by `bluetooth.max_scan_duration_secs`.
    pub duration: Option<u64>,
}

async fn bluetooth_devices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScanQuery>,
) -> Result<Response, AppError> {
    let summary = state
        .bluetooth
        .scan_devices(query.duration.map(Duration::from_secs))
        .await
        .map_err(|e| AppError::bluetooth(e, "Failed to scan for Bluetooth devices"))?;

    let interrupted = summary.termination.is_interrupted();
    let mut response = Json::<Vec<DeviceSummary>>(summary.devices).into_response();
    if interrupted {
        response
            .headers_mut()
            .insert(SCAN_INTERRUPTED_HEADER, HeaderValue::from_static("true"));
    }
    Ok(response)
}

/// Body for requests naming a single device.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeviceRequest {
    pub address: Option<String>,
    pub name: Option<String>,
}

/// Successful connect response.
#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub message: String,
    pub device: ConnectedDevice,
}

async fn bluetooth_connect(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeviceRequest>,
) -> Result<Json<ConnectResponse>, AppError> {
    let address = required(request.address)
        .ok_or_else(|| AppError::BadRequest(ADDRESS_REQUIRED.to_string()))?;

    let device = state
        .bluetooth
        .connect_device(&address)
        .await
        .map_err(|e| AppError::bluetooth(e, "Failed to connect to device"))?;

    Ok(Json(ConnectResponse {
        message: format!("Successfully connected to {}", device.name),
        device,
    }))
}

async fn bluetooth_disconnect(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>, AppError> {
    let device = state
        .bluetooth
        .disconnect_device()
        .await
        .map_err(|e| AppError::bluetooth(e, "Failed to disconnect device"))?;
    Ok(MessageResponse::new(format!(
        "Successfully disconnected from {}",
        device.name
    )))
}

/// Successful save response.
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub message: String,
    pub device: SavedDevice,
}

async fn bluetooth_save(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeviceRequest>,
) -> Result<Json<SaveResponse>, AppError> {
    let address = required(request.address)
        .ok_or_else(|| AppError::BadRequest(ADDRESS_REQUIRED.to_string()))?;
    let name = request.name.filter(|n| !n.trim().is_empty());

    let device = state
        .bluetooth
        .save_device(&address, name.as_deref())
        .map_err(|e| AppError::bluetooth(e, "Failed to save device."))?;

    Ok(Json(SaveResponse {
        message: format!(
            "Successfully saved device {}",
            name.unwrap_or_else(|| address.clone())
        ),
        device,
    }))
}

/// Scan stop response.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    /// False when no scan was running.
    pub stopped: bool,
}

async fn bluetooth_scan_stop(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: state.bluetooth.stop_scan(),
    })
}

async fn bluetooth_previous_devices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SavedDevice>>, AppError> {
    let devices = state
        .bluetooth
        .list_previous_devices()
        .map_err(|e| AppError::bluetooth(e, "Failed to retrieve previous devices."))?;
    Ok(Json(devices))
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// Coordinator failure with the message used when it maps to a 500.
    Bluetooth(netnexus_core::Error, String),
    /// Wi-Fi failure with the message used when it maps to a 500.
    Wifi(WifiError, String),
}

impl AppError {
    fn bluetooth(error: netnexus_core::Error, context: impl Into<String>) -> Self {
        AppError::Bluetooth(error, context.into())
    }

    fn wifi(error: WifiError, context: impl Into<String>) -> Self {
        AppError::Wifi(error, context.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use netnexus_core::Error;

        let (status, message, details) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Bluetooth(e, context) => match e {
                Error::AlreadyScanning => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "A Bluetooth scan is already in progress.".to_string(),
                    None,
                ),
                Error::DeviceNotFound(_) => (
                    StatusCode::NOT_FOUND,
                    DEVICE_NOT_FOUND.to_string(),
                    Some(e.to_string()),
                ),
                Error::InvalidAddress(_) => (StatusCode::BAD_REQUEST, e.to_string(), None),
                Error::NotConnected => (StatusCode::CONFLICT, e.to_string(), None),
                Error::Wifi(wifi) => wifi_status(wifi, context),
                other => {
                    error!("{}: {}", context, other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        context,
                        Some(other.to_string()),
                    )
                }
            },
            AppError::Wifi(e, context) => wifi_status(e, context),
        };

        let body = match details {
            Some(details) => serde_json::json!({ "error": message, "details": details }),
            None => serde_json::json!({ "error": message }),
        };

        (status, Json(body)).into_response()
    }
}

fn wifi_status(e: WifiError, context: String) -> (StatusCode, String, Option<String>) {
    match e {
        WifiError::PasswordRequired { .. } => (StatusCode::UNAUTHORIZED, e.to_string(), None),
        WifiError::NetworkNotFound { .. } => (StatusCode::NOT_FOUND, context, Some(e.to_string())),
        WifiError::NotConnected => (StatusCode::CONFLICT, e.to_string(), None),
        other => {
            error!("{}: {}", context, other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                context,
                Some(other.to_string()),
            )
        }
    }
}

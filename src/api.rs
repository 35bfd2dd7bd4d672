use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use sqlx::types::uuid::Uuid;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};

use crate::db::DeviceStore;
use crate::error::{PushServiceError, RegistrationError};
use crate::metrics;
use crate::models::{DeviceToken, NotificationSetting, NotifyTypes, PushDevice};
use crate::registration::register_push_device;
use crate::zeropush::PushRegistrar;

const MAX_BODY_BYTES: usize = 16 * 1024;

// Request and response models
#[derive(Deserialize)]
struct RegisterRequest {
    user_id: Uuid,
    device_token: String,
    #[serde(default)]
    notify_types: Option<NotifyTypes>,
}

#[derive(Deserialize)]
struct DevicesQuery {
    user_id: Option<Uuid>,
    token: Option<String>,
}

#[derive(Deserialize)]
struct NotificationSettingRequest {
    device_id: Uuid,
    name: String,
    send: bool,
}

// API state
pub struct ApiState<S, R> {
    pub store: S,
    pub registrar: R,
}

#[derive(Debug)]
pub enum ApiError {
    Registration(RegistrationError),
    BadRequest(String),
    NotFound(String),
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        ApiError::Registration(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Registration(RegistrationError::Store(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Registration(RegistrationError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Registration(RegistrationError::RegistrationFailed(e)) => {
                let message = match e {
                    PushServiceError::Rejected { status, .. } => {
                        format!("push service rejected the device token (status {})", status)
                    }
                    other => other.to_string(),
                };
                (StatusCode::BAD_GATEWAY, message)
            }
            ApiError::Registration(RegistrationError::Store(e)) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// Set up API router
pub fn create_api_router<S, R>(state: Arc<ApiState<S, R>>, max_concurrency: usize) -> Router
where
    S: DeviceStore + Send + Sync + 'static,
    R: PushRegistrar + Send + Sync + 'static,
{
    Router::new()
        .route("/register", post(register_device::<S, R>))
        .route("/devices", get(list_devices::<S, R>))
        .route(
            "/notification-settings",
            put(update_notification_setting::<S, R>),
        )
        .route("/health_check", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(max_concurrency))
        .layer(CorsLayer::permissive()) // For development - restrict in production
}

// API handlers
async fn register_device<S, R>(
    State(state): State<Arc<ApiState<S, R>>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PushDevice>), ApiError>
where
    S: DeviceStore + Send + Sync + 'static,
    R: PushRegistrar + Send + Sync + 'static,
{
    tracing::info!("Registering device for user: {}", req.user_id);

    let device = register_push_device(
        &state.store,
        &state.registrar,
        req.user_id,
        req.device_token,
        req.notify_types,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(device)))
}

async fn list_devices<S, R>(
    State(state): State<Arc<ApiState<S, R>>>,
    Query(query): Query<DevicesQuery>,
) -> Result<Json<Vec<PushDevice>>, ApiError>
where
    S: DeviceStore + Send + Sync + 'static,
    R: PushRegistrar + Send + Sync + 'static,
{
    let devices = match (query.token, query.user_id) {
        (Some(token), _) => {
            let token = DeviceToken::parse(token)?;
            state.store.devices_by_token(&token).await?
        }
        (None, Some(user_id)) => state.store.devices_for_user(user_id).await?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either user_id or token is required".to_string(),
            ))
        }
    };

    Ok(Json(devices))
}

async fn update_notification_setting<S, R>(
    State(state): State<Arc<ApiState<S, R>>>,
    Json(req): Json<NotificationSettingRequest>,
) -> Result<Json<NotificationSetting>, ApiError>
where
    S: DeviceStore + Send + Sync + 'static,
    R: PushRegistrar + Send + Sync + 'static,
{
    let setting = state
        .store
        .set_notification_send(req.device_id, req.name.trim(), req.send)
        .await?;

    match setting {
        Some(setting) => {
            tracing::info!(
                device_id = %req.device_id,
                name = %setting.name,
                send = setting.send,
                "Notification setting updated"
            );
            Ok(Json(setting))
        }
        None => Err(ApiError::NotFound(format!(
            "no notification setting '{}' for device {}",
            req.name, req.device_id
        ))),
    }
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn metrics_endpoint() -> String {
    metrics::metrics_handler()
}

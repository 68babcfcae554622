//! Signed-URL issuing service
//!
//! Small HTTP service the client calls before uploading a photo. It signs a
//! short-lived PUT URL with server-side storage credentials, so the client
//! itself never holds them.

mod signer;

pub use signer::UrlSigner;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::{Error, Result};

/// Shared state for request handlers
pub struct ServerState {
    bucket: String,
    signer: UrlSigner,
    upload_expiry_secs: u64,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// Liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlRequest {
    filename: Option<String>,
    content_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlResponse {
    signed_url: String,
    gs_uri: String,
    https_url: String,
}

/// Handler-level errors with their HTTP mapping
enum ApiError {
    MissingFilename,
    Signing(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::MissingFilename => (StatusCode::BAD_REQUEST, "filename is required".to_string()),
            Self::Signing(e) => {
                tracing::error!(error = %e, "URL signing failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to sign upload URL".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Issue a signed upload target for one photo
///
/// Object names are prefixed with the request time in milliseconds, so
/// repeated uploads of the same filename never collide.
async fn get_upload_url(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<UploadUrlRequest>,
) -> std::result::Result<Json<UploadUrlResponse>, ApiError> {
    let filename = request
        .filename
        .filter(|f| !f.trim().is_empty())
        .ok_or(ApiError::MissingFilename)?;
    let filename = sanitize_filename(&filename);
    let content_type = request
        .content_type
        .unwrap_or_else(|| "image/jpeg".to_string());

    let now = Utc::now();
    let object = format!("uploads/{}-{filename}", now.timestamp_millis());

    let signed_url = state
        .signer
        .signed_put_url(&object, &content_type, state.upload_expiry_secs, now)
        .map_err(|e| ApiError::Signing(e.to_string()))?;

    tracing::info!(object = %object, content_type = %content_type, "upload target issued");

    Ok(Json(UploadUrlResponse {
        signed_url,
        gs_uri: format!("gs://{}/{object}", state.bucket),
        https_url: format!("https://storage.googleapis.com/{}/{object}", state.bucket),
    }))
}

/// Strip path separators so a filename cannot escape the uploads prefix
fn sanitize_filename(filename: &str) -> String {
    filename.trim().replace(['/', '\\'], "_")
}

/// The issuing service
pub struct ApiServer {
    port: u16,
    state: Arc<ServerState>,
}

impl ApiServer {
    /// Build the service from configuration
    ///
    /// # Errors
    ///
    /// Returns `Config` if the bucket or HMAC credentials are missing
    pub fn new(config: &ServerConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::Config("GCS_BUCKET_NAME not set".to_string()));
        }
        let access_id = config
            .hmac_access_id
            .clone()
            .ok_or_else(|| Error::Config("GCS_HMAC_ACCESS_ID not set".to_string()))?;
        let secret = config
            .hmac_secret
            .clone()
            .ok_or_else(|| Error::Config("GCS_HMAC_SECRET not set".to_string()))?;

        Ok(Self {
            port: config.port,
            state: Arc::new(ServerState {
                bucket: config.bucket.clone(),
                signer: UrlSigner::new(config.bucket.clone(), access_id, secret),
                upload_expiry_secs: config.upload_expiry_secs,
            }),
        })
    }

    /// Build the full router with CORS and request tracing
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(health))
            .route("/api/get-upload-url", post(get_upload_url))
            .with_state(Arc::clone(&self.state))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the service until shutdown
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound
    pub async fn run(&self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind issuing service: {e}")))?;

        tracing::info!(port = self.port, "issuing service listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("issuing service error: {e}")))?;

        Ok(())
    }
}

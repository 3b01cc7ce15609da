//! HTTP handlers.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use smsfeed_core::MessageId;

use crate::feed::socket::run_viewer_session;
use crate::health::{self, HealthResponse};
use crate::ingest::IngestError;
use crate::server::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
pub struct SmsCreate {
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SmsCreated {
    pub status: &'static str,
    pub id: MessageId,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match &self {
            IngestError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized", "Invalid API Key")
            }
            IngestError::StoreUnavailable(e) => {
                error!(error = %e, "ingest failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "store_unavailable",
                    "Message could not be stored",
                )
            }
        };
        (status, Json(json!({ "error": code, "detail": detail }))).into_response()
    }
}

/// POST /api/sms
pub async fn create_sms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SmsCreate>,
) -> Result<(StatusCode, Json<SmsCreated>), IngestError> {
    let credential = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    let message = state
        .ingest
        .submit(&body.sender, &body.text, credential)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SmsCreated {
            status: "ok",
            id: message.id,
        }),
    ))
}

/// GET /
pub async fn history_page(State(state): State<AppState>) -> Response {
    match state.store.recent(state.renderer.limit()).await {
        Ok(messages) => Html(state.renderer.page(&messages)).into_response(),
        Err(e) => {
            warn!(error = %e, "history query failed");
            (StatusCode::SERVICE_UNAVAILABLE, "history unavailable").into_response()
        }
    }
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let registry = state.registry.clone();
    let options = state.session_options;
    let shutdown = state.shutdown.child_token();
    let sessions = state.sessions.clone();
    ws.on_upgrade(move |socket| {
        sessions.track_future(async move {
            run_viewer_session(socket, registry, options, shutdown).await;
        })
    })
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.len()))
}

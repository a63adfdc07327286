use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::importer::mode::{ImportForm, ImportMode};
use crate::sync::SyncService;
use crate::trello::webhook::WebhookPayload;

#[derive(Debug, Serialize)]
pub struct SendToTracResponse {
    pub ok: bool,
    pub message: String,
}

pub fn router(service: SyncService) -> Router {
    Router::new()
        .route("/trello/webhook", get(webhook_callback_check).post(receive_webhook))
        .route("/trello/sendtotrac", get(send_to_trac))
        .route("/trello/activemilestones", get(active_milestones))
        .with_state(service)
}

pub async fn serve(service: SyncService, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("listening on {bind}");
    axum::serve(listener, router(service))
        .await
        .context("HTTP server stopped")?;
    Ok(())
}

/// Trello checks the callback URL with a HEAD request before creating a webhook;
/// `get` answers HEAD as well.
async fn webhook_callback_check() -> StatusCode {
    StatusCode::OK
}

async fn receive_webhook(State(service): State<SyncService>, body: Bytes) -> StatusCode {
    if body.iter().all(u8::is_ascii_whitespace) {
        return StatusCode::OK;
    }
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "malformed webhook payload");
            return StatusCode::BAD_REQUEST;
        }
    };
    match service.handle_webhook(&payload).await {
        Ok(outcome) => {
            info!(?outcome, action = %payload.action.id, "webhook handled");
            StatusCode::OK
        }
        Err(e) => {
            error!(error = %e, action = %payload.action.id, "webhook failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn send_to_trac(
    State(service): State<SyncService>,
    Query(form): Query<ImportForm>,
) -> Json<SendToTracResponse> {
    let response = match service.import(ImportMode::Remote, &form).await {
        Ok(report) => match report.outcomes.into_iter().next() {
            Some(outcome) => SendToTracResponse {
                ok: outcome.result.is_ok(),
                message: outcome.to_string(),
            },
            None => SendToTracResponse {
                ok: false,
                message: "No card to import.".into(),
            },
        },
        Err(e) => {
            if !e.aborts_request() {
                error!(error = %e, "send to Trac failed");
            }
            SendToTracResponse {
                ok: false,
                message: e.to_string(),
            }
        }
    };
    Json(response)
}

async fn active_milestones(
    State(service): State<SyncService>,
) -> Result<Json<Vec<String>>, (StatusCode, String)> {
    service.active_milestones().await.map(Json).map_err(|e| {
        error!(error = %e, "could not list milestones");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

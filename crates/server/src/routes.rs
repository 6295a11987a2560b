//! Public HTTP surface for quote dispatch, token redemption, and provider
//! webhooks.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use printshop_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use printshop_core::errors::ApprovalError;
use printshop_core::store::StoreError;
use printshop_core::{ApprovalService, QuoteSummary};
use printshop_delivery::webhook::parse_events;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ApprovalService>,
}

pub fn router(service: Arc<ApprovalService>) -> Router {
    Router::new()
        .route("/quotes/{id}/send", post(send_quote))
        .route("/quotes/verify/{token}", get(verify_token))
        .route("/quotes/approve/{token}", get(approve_quote))
        .route("/quotes/reject/{token}", post(reject_quote))
        .route("/quotes/webhook", post(delivery_webhook))
        .with_state(AppState { service })
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuoteActionResponse {
    pub quote_id: QuoteId,
    pub status: QuoteStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl From<Quote> for QuoteActionResponse {
    fn from(quote: Quote) -> Self {
        Self {
            quote_id: quote.id,
            status: quote.status,
            sent_at: quote.sent_at,
            approved_at: quote.approved_at,
            rejected_at: quote.rejected_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub received: usize,
    pub matched: usize,
}

type ErrorReply = (StatusCode, Json<ErrorResponse>);

async fn send_quote(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuoteActionResponse>, ErrorReply> {
    let quote = state
        .service
        .send_quote(&QuoteId(id), Utc::now())
        .await
        .map_err(error_reply)?;
    Ok(Json(quote.into()))
}

async fn verify_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<QuoteSummary>, ErrorReply> {
    let summary = state
        .service
        .verify_token(&token, Utc::now())
        .await
        .map_err(error_reply)?;
    Ok(Json(summary))
}

async fn approve_quote(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<QuoteActionResponse>, ErrorReply> {
    let quote = state.service.approve(&token, Utc::now()).await.map_err(error_reply)?;
    Ok(Json(quote.into()))
}

async fn reject_quote(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<QuoteActionResponse>, ErrorReply> {
    let reason = body.and_then(|Json(request)| request.reason).unwrap_or_default();
    let quote = state
        .service
        .reject(&token, &reason, Utc::now())
        .await
        .map_err(error_reply)?;
    Ok(Json(quote.into()))
}

/// Provider event batches are acknowledged even when nothing matches, so the
/// provider does not retry forever. Only a malformed body is a client error.
async fn delivery_webhook(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<WebhookResponse>, ErrorReply> {
    let events = parse_events(&body).map_err(|error| {
        warn!(event_name = "http.webhook.malformed", %error, "rejecting webhook payload");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "malformed webhook payload".to_string() }),
        )
    })?;

    let received = events.len();
    let mut matched = 0;
    for event in events {
        if state.service.handle_delivery_webhook(event).await.map_err(error_reply)? {
            matched += 1;
        }
    }

    info!(event_name = "http.webhook.processed", received, matched, "webhook batch processed");
    Ok(Json(WebhookResponse { received, matched }))
}

fn error_reply(error: ApprovalError) -> ErrorReply {
    // Unknown quote ids only reach here from the operator-facing send
    // endpoint; token redemption paths report NotActionable instead.
    if let ApprovalError::Store(StoreError::NotFound(quote_id)) = &error {
        info!(event_name = "http.request.denied", quote_id = %quote_id, "quote not found");
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: "Quote not found.".to_string() }),
        );
    }

    let status = match &error {
        // One neutral Gone response for every token or state failure; the
        // split reason stays in the logs only.
        ApprovalError::Token(_) | ApprovalError::NotActionable(_) => StatusCode::GONE,
        ApprovalError::AlreadySent(_) => StatusCode::CONFLICT,
        ApprovalError::Delivery(_) => StatusCode::BAD_GATEWAY,
        ApprovalError::Store(_) | ApprovalError::Configuration(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    if status.is_server_error() {
        warn!(event_name = "http.request.failed", %error, "request failed");
    } else {
        info!(event_name = "http.request.denied", %error, "request denied");
    }

    (status, Json(ErrorResponse { error: error.user_message().to_string() }))
}

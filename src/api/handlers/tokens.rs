use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::device::parse_user_agent;
use crate::identity::Credentials;
use crate::storage::models::LoginToken;
use crate::tokens::TokenStatus;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTokenResponse {
    pub expires_at: String,
    pub id: String,
    /// Scannable payload for the QR code
    pub login_url: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<String>,
    pub status: TokenStatus,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub claimer_id: String,
}

/// Either a pre-resolved identity (mobile session already authenticated) or
/// raw credentials for the injected validator.
#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    #[serde(default)]
    pub consumer_id: Option<String>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Serialize)]
pub struct TokenView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub id: String,
    pub state: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTokenRequest>,
) -> Result<Json<JSend<CreateTokenResponse>>, ApiError> {
    let device_info = req
        .user_agent
        .as_deref()
        .map(parse_user_agent)
        .unwrap_or_default();

    let row = state.service.create_token(device_info, req.ip_address)?;
    let login_url = state.login_url.encode(&row.token);

    Ok(JSend::success(CreateTokenResponse {
        expires_at: row.expires_at.to_rfc3339(),
        id: row.id,
        login_url,
        token: row.token,
    }))
}

/// Desktop polling endpoint. Always 200; pollers branch on the status field
/// (including `not_found`), never on the HTTP code.
pub async fn token_status(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<JSend<StatusResponse>>, ApiError> {
    let view = state.service.get_status(&token)?;

    Ok(JSend::success(StatusResponse {
        claimed_at: view.claimed_at.map(rfc3339),
        consumed_at: view.consumed_at.map(rfc3339),
        status: view.status,
    }))
}

pub async fn claim_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<JSend<TokenView>>, ApiError> {
    if req.claimer_id.trim().is_empty() {
        return Err(ApiError::bad_request("claimer_id is required"));
    }

    let row = state.service.claim(&token, &req.claimer_id)?;
    Ok(JSend::success(token_view(&row)))
}

pub async fn consume_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<ConsumeRequest>,
) -> Result<Json<JSend<TokenView>>, ApiError> {
    let consumer_id = match (req.consumer_id, req.credentials) {
        (Some(id), _) if !id.trim().is_empty() => id,
        (_, Some(credentials)) => state
            .credential_validator
            .resolve_identity(&credentials)
            .map_err(|e| ApiError::unauthorized(e.to_string()))?,
        _ => {
            return Err(ApiError::bad_request(
                "consumer_id or credentials is required",
            ))
        }
    };

    let row = state.service.consume(&token, &consumer_id)?;
    Ok(JSend::success(token_view(&row)))
}

/// Admin lookup by row id, for support tooling that records ids rather than
/// the secret token string.
pub async fn get_token_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<TokenView>>, ApiError> {
    let row = state
        .service
        .db()
        .get_token_by_id(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Token not found"))?;

    Ok(JSend::success(token_view(&row)))
}

pub async fn cancel_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<JSend<TokenView>>, ApiError> {
    let row = state.service.cancel(&token)?;
    Ok(JSend::success(token_view(&row)))
}

// ============================================================================
// Helpers
// ============================================================================

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

fn token_view(row: &LoginToken) -> TokenView {
    TokenView {
        cancelled_at: row.cancelled_at.map(rfc3339),
        claimed_at: row.claimed_at.map(rfc3339),
        claimer_id: row.claimer_id.clone(),
        consumed_at: row.consumed_at.map(rfc3339),
        consumer_id: row.consumer_id.clone(),
        created_at: rfc3339(row.created_at),
        expires_at: rfc3339(row.expires_at),
        id: row.id.clone(),
        state: row.state.to_string(),
    }
}

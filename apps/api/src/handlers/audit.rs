use axum::extract::{Query, State};
use axum::{Extension, Json};
use casare_core::Principal;
use casare_domain::{ActorRef, AuditLogEntry, Permission};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AuditEntryResponse {
    pub sequence_id: u64,
    pub entry_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub action: &'static str,
    pub actor: ActorRef,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl From<AuditLogEntry> for AuditEntryResponse {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            sequence_id: entry.sequence_id(),
            entry_id: entry.entry_id().as_uuid(),
            timestamp: entry.timestamp(),
            action: entry.action().as_str(),
            actor: entry.actor().clone(),
            resource_type: entry.resource().resource_type.clone(),
            resource_id: entry.resource().resource_id.clone(),
            details: entry.details().clone(),
            ip_address: entry.ip_address().map(str::to_owned),
            user_agent: entry.user_agent().map(str::to_owned),
            previous_hash: hex::encode(entry.previous_hash()),
            entry_hash: hex::encode(entry.entry_hash()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditRangeQuery {
    pub start_id: u64,
    pub end_id: u64,
}

/// `GET /audit?start_id=..&end_id=..`
pub async fn read_range_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AuditRangeQuery>,
) -> ApiResult<Json<Vec<AuditEntryResponse>>> {
    state.tenant_gateway.authorize(&principal, Permission::AuditRead)?;

    let entries = state
        .audit_log
        .read_range(Some(principal.tenant_id()), query.start_id, query.end_id)
        .await?;

    Ok(Json(entries.into_iter().map(AuditEntryResponse::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct ChainVerificationResponse {
    pub is_valid: bool,
    pub first_invalid_id: Option<u64>,
}

/// `GET /audit/verify?start_id=..&end_id=..`
pub async fn verify_chain_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AuditRangeQuery>,
) -> ApiResult<Json<ChainVerificationResponse>> {
    state.tenant_gateway.authorize(&principal, Permission::AuditRead)?;

    let verification = state
        .audit_log
        .verify_chain(Some(principal.tenant_id()), query.start_id, query.end_id)
        .await?;

    Ok(Json(ChainVerificationResponse {
        is_valid: verification.is_valid,
        first_invalid_id: verification.first_invalid_id,
    }))
}

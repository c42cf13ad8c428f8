/// Moderation endpoints: change proposals and review
use crate::{
    api::ApiResponse,
    auth::{AuthContext, ReviewerAuthContext},
    context::AppContext,
    error::{PortalError, PortalResult},
    ledger::{ChangeType, PendingChange},
    moderation::RequestMeta,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/changes", post(submit_change))
        .route("/api/moderation/queue", get(queue))
        .route("/api/moderation/:id/approve", post(approve))
        .route("/api/moderation/:id/reject", post(reject))
}

#[derive(Debug, Deserialize)]
struct SubmitChangeRequest {
    change_type: ChangeType,
    host_id: Uuid,
    /// Partial field set for updates; omit for deletion requests
    payload: Option<serde_json::Value>,
}

/// Propose a change to an owned record
async fn submit_change(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    meta: RequestMeta,
    Json(req): Json<SubmitChangeRequest>,
) -> PortalResult<Json<ApiResponse<PendingChange>>> {
    let change = ctx
        .workflow
        .submit_change(&auth.actor, req.change_type, req.host_id, req.payload, meta)
        .await?;

    Ok(ApiResponse::ok(change))
}

#[derive(Debug, Deserialize)]
struct QueueParams {
    change_type: Option<String>,
    limit: Option<i64>,
}

/// Open changes awaiting review
async fn queue(
    State(ctx): State<AppContext>,
    auth: ReviewerAuthContext,
    Query(params): Query<QueueParams>,
) -> PortalResult<Json<ApiResponse<Vec<PendingChange>>>> {
    let change_type = params
        .change_type
        .as_deref()
        .map(ChangeType::from_str)
        .transpose()?;
    let limit = params.limit.unwrap_or(50).min(100);

    let changes = ctx
        .workflow
        .pending_queue(&auth.actor, change_type, limit)
        .await?;

    Ok(ApiResponse::ok(changes))
}

/// Approve a pending change, applying it to the host record
async fn approve(
    State(ctx): State<AppContext>,
    auth: ReviewerAuthContext,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<ApiResponse<PendingChange>>> {
    let change = ctx.workflow.approve_change(&auth.actor, id, meta).await?;
    Ok(ApiResponse::ok(change))
}

#[derive(Debug, Deserialize, Default)]
struct RejectRequest {
    reason: Option<String>,
}

/// Reject a pending change, leaving the host record untouched
async fn reject(
    State(ctx): State<AppContext>,
    auth: ReviewerAuthContext,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> PortalResult<Json<ApiResponse<PendingChange>>> {
    let reason = body.and_then(|Json(req)| req.reason).and_then(|r| {
        let trimmed = r.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    });

    if let Some(reason) = &reason {
        if reason.len() > 2000 {
            return Err(PortalError::Validation(
                "Rejection reason too long".to_string(),
            ));
        }
    }

    let change = ctx
        .workflow
        .reject_change(&auth.actor, id, reason, meta)
        .await?;

    Ok(ApiResponse::ok(change))
}

/// Administrative endpoints: user management, role grants, audit queries
use crate::{
    access::{self, Actor, Capability, Role},
    api::ApiResponse,
    audit::{AuditAction, AuditDetails, AuditEvent, AuditLogEntry, AuditQuery, AuditResource},
    auth::AuthContext,
    context::AppContext,
    entities::User,
    error::{PortalError, PortalResult},
    moderation::RequestMeta,
};
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id", delete(delete_user))
        .route("/api/admin/roles/grant", post(grant_role))
        .route("/api/admin/roles/revoke", post(revoke_role))
        .route("/api/admin/audit", get(query_audit))
}

fn require(actor: &Actor, capability: Capability) -> PortalResult<()> {
    if access::evaluate(actor, capability) {
        Ok(())
    } else {
        Err(PortalError::Authorization(format!(
            "Missing capability: {}",
            capability.as_str()
        )))
    }
}

#[derive(Debug, Deserialize)]
struct ListUsersParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list_users(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<ListUsersParams>,
) -> PortalResult<Json<ApiResponse<Vec<User>>>> {
    require(&auth.actor, Capability::ManageUsers)?;

    let limit = params.limit.unwrap_or(50).min(100);
    let offset = params.offset.unwrap_or(0);
    let users = ctx.users.list(limit, offset).await?;
    Ok(ApiResponse::ok(users))
}

#[derive(Debug, Deserialize)]
struct RoleRequest {
    user_id: Uuid,
    role: String,
    notes: Option<String>,
}

/// Assign a role. Granting a role at or above the granter's own rank is
/// reserved for superadmins.
async fn grant_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    meta: RequestMeta,
    Json(req): Json<RoleRequest>,
) -> PortalResult<Json<ApiResponse<User>>> {
    require(&auth.actor, Capability::ManageRoles)?;

    let role = Role::from_str(&req.role)?;
    check_rank(&auth.actor, role)?;

    let subject = ctx
        .users
        .find_by_id(req.user_id)
        .await?
        .ok_or_else(|| PortalError::NotFound(format!("User {} not found", req.user_id)))?;
    check_rank_of_subject(&auth.actor, &subject)?;

    ctx.users.set_role(req.user_id, role).await?;

    ctx.audit
        .record(
            AuditEvent::new(&auth.actor, AuditAction::RoleGranted, AuditResource::Role)
                .resource_id(req.user_id)
                .details(AuditDetails::RoleChange {
                    subject_id: req.user_id,
                    role: role.as_str().to_string(),
                    notes: req.notes,
                })
                .request_meta(meta.ip_address, meta.user_agent),
        )
        .await;

    let user = ctx
        .users
        .find_by_id(req.user_id)
        .await?
        .ok_or_else(|| PortalError::Internal("User vanished after role update".to_string()))?;
    Ok(ApiResponse::ok(user))
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    user_id: Uuid,
    notes: Option<String>,
}

/// Drop a user back to the student role
async fn revoke_role(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    meta: RequestMeta,
    Json(req): Json<RevokeRequest>,
) -> PortalResult<Json<ApiResponse<User>>> {
    require(&auth.actor, Capability::ManageRoles)?;

    let subject = ctx
        .users
        .find_by_id(req.user_id)
        .await?
        .ok_or_else(|| PortalError::NotFound(format!("User {} not found", req.user_id)))?;
    check_rank_of_subject(&auth.actor, &subject)?;

    ctx.users.set_role(req.user_id, Role::Student).await?;

    ctx.audit
        .record(
            AuditEvent::new(&auth.actor, AuditAction::RoleRevoked, AuditResource::Role)
                .resource_id(req.user_id)
                .details(AuditDetails::RoleChange {
                    subject_id: req.user_id,
                    role: Role::Student.as_str().to_string(),
                    notes: req.notes,
                })
                .request_meta(meta.ip_address, meta.user_agent),
        )
        .await;

    let user = ctx
        .users
        .find_by_id(req.user_id)
        .await?
        .ok_or_else(|| PortalError::Internal("User vanished after role update".to_string()))?;
    Ok(ApiResponse::ok(user))
}

async fn delete_user(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<ApiResponse<()>>> {
    require(&auth.actor, Capability::DeleteAnyUser)?;

    if id == auth.actor.id {
        return Err(PortalError::Validation(
            "Cannot delete your own account through the admin endpoint".to_string(),
        ));
    }

    let subject = ctx
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| PortalError::NotFound(format!("User {} not found", id)))?;
    check_rank_of_subject(&auth.actor, &subject)?;

    ctx.users.delete(id).await?;

    ctx.audit
        .record(
            AuditEvent::new(&auth.actor, AuditAction::UserDeleted, AuditResource::User)
                .resource_id(id)
                .request_meta(meta.ip_address, meta.user_agent),
        )
        .await;

    Ok(ApiResponse::ok(()))
}

#[derive(Debug, Deserialize)]
struct AuditParams {
    actor_id: Option<Uuid>,
    action: Option<String>,
    resource: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn query_audit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<AuditParams>,
) -> PortalResult<Json<ApiResponse<Vec<AuditLogEntry>>>> {
    require(&auth.actor, Capability::ViewAuditLogs)?;

    let query = AuditQuery {
        actor_id: params.actor_id,
        action: params
            .action
            .as_deref()
            .map(AuditAction::from_str)
            .transpose()?,
        resource: params
            .resource
            .as_deref()
            .map(AuditResource::from_str)
            .transpose()?,
        start: params.start,
        end: params.end,
        limit: params.limit.map(|l| l.min(500)),
        offset: params.offset,
    };

    let entries = ctx.audit.query(query).await;
    Ok(ApiResponse::ok(entries))
}

/// A granter may only hand out roles strictly below their own; superadmins
/// are exempt.
fn check_rank(granter: &Actor, granted: Role) -> PortalResult<()> {
    match granter.role {
        Some(Role::SuperAdmin) => Ok(()),
        Some(own) if granted < own => Ok(()),
        _ => Err(PortalError::Authorization(
            "Cannot grant a role at or above your own".to_string(),
        )),
    }
}

/// Acting on a subject whose current role is at or above the caller's own
/// is reserved for superadmins.
fn check_rank_of_subject(caller: &Actor, subject: &User) -> PortalResult<()> {
    let subject_role = Role::from_str(&subject.role).ok();
    match (caller.role, subject_role) {
        (Some(Role::SuperAdmin), _) => Ok(()),
        (Some(own), Some(theirs)) if theirs < own => Ok(()),
        (Some(_), None) => Ok(()),
        _ => Err(PortalError::Authorization(
            "Cannot act on a user at or above your own role".to_string(),
        )),
    }
}

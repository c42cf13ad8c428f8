/// Account endpoints: registration, login, session
use crate::{
    account::{LoginRequest, RegisterRequest, SessionResponse},
    api::ApiResponse,
    audit::{AuditAction, AuditEvent, AuditResource},
    auth::AuthContext,
    context::AppContext,
    entities::User,
    error::PortalResult,
    moderation::RequestMeta,
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/account/register", post(register))
        .route("/api/account/login", post(login))
        .route("/api/account/logout", post(logout))
        .route("/api/account/me", get(me))
}

/// Register a new student account
async fn register(
    State(ctx): State<AppContext>,
    meta: RequestMeta,
    Json(req): Json<RegisterRequest>,
) -> PortalResult<Json<ApiResponse<User>>> {
    let user = ctx.accounts.register(req).await?;

    ctx.audit
        .record(
            AuditEvent::new(&user.actor(), AuditAction::AccountRegistered, AuditResource::User)
                .resource_id(user.id)
                .request_meta(meta.ip_address, meta.user_agent),
        )
        .await;

    Ok(ApiResponse::ok(user))
}

/// Open a session
async fn login(
    State(ctx): State<AppContext>,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> PortalResult<Json<ApiResponse<SessionResponse>>> {
    let session = ctx.accounts.login(req).await?;

    if let Some(user) = ctx.users.find_by_id(session.user_id).await? {
        ctx.audit
            .record(
                AuditEvent::new(&user.actor(), AuditAction::Login, AuditResource::User)
                    .resource_id(user.id)
                    .request_meta(meta.ip_address, meta.user_agent),
            )
            .await;
    }

    Ok(ApiResponse::ok(session))
}

/// Close the current session
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<ApiResponse<()>>> {
    ctx.accounts.revoke_session(auth.session.session_id).await?;
    Ok(ApiResponse::ok(()))
}

/// Current account
async fn me(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<ApiResponse<Option<User>>>> {
    let user = ctx.users.find_by_id(auth.actor.id).await?;
    Ok(ApiResponse::ok(user))
}

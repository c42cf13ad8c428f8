/// Authentication extractors and utilities
use crate::{
    access::{Actor, Role},
    account::ValidatedSession,
    context::AppContext,
    error::PortalError,
    moderation::RequestMeta,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Authenticated context: validates the session and loads the actor
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: Actor,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = PortalError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| PortalError::Authentication("Missing authorization header".to_string()))?;

        let session = state.accounts.validate_access_token(&token).await?;

        let user = state
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or_else(|| PortalError::Authentication("Account no longer exists".to_string()))?;

        Ok(AuthContext {
            actor: user.actor(),
            session,
        })
    }
}

/// Reviewer context: any role at moderator level or above. Handlers still
/// check the specific capability through the access module.
#[derive(Debug, Clone)]
pub struct ReviewerAuthContext {
    pub actor: Actor,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for ReviewerAuthContext {
    type Rejection = PortalError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;

        let permitted = auth
            .actor
            .role
            .map(|r| r.can_act_as(Role::Moderator))
            .unwrap_or(false);
        if !permitted {
            tracing::warn!(actor = %auth.actor.id, "reviewer endpoint denied");
            return Err(PortalError::Authorization(
                "Reviewer role required".to_string(),
            ));
        }

        Ok(ReviewerAuthContext {
            actor: auth.actor,
            session: auth.session,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for RequestMeta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
        };

        Ok(RequestMeta {
            ip_address: header("x-forwarded-for"),
            user_agent: header("user-agent"),
        })
    }
}

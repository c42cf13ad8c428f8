/// Idea submission endpoints
use crate::{
    api::ApiResponse,
    auth::AuthContext,
    context::AppContext,
    entities::Idea,
    error::{PortalError, PortalResult},
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/ideas", post(create_idea).get(list_ideas))
        .route("/api/ideas/:id", get(get_idea))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateIdeaRequest {
    #[validate(length(min = 1, max = 300))]
    title: String,
    #[validate(length(min = 1, max = 5000))]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// Submit an idea
async fn create_idea(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreateIdeaRequest>,
) -> PortalResult<Json<ApiResponse<Idea>>> {
    req.validate()
        .map_err(|e| PortalError::Validation(e.to_string()))?;

    let idea = ctx
        .ideas
        .create(auth.actor.id, &req.title, &req.description)
        .await?;

    Ok(ApiResponse::ok(idea))
}

/// List ideas, newest first
async fn list_ideas(
    State(ctx): State<AppContext>,
    Query(params): Query<ListParams>,
) -> PortalResult<Json<ApiResponse<Vec<Idea>>>> {
    let limit = params.limit.unwrap_or(50).min(100);
    let offset = params.offset.unwrap_or(0);
    let ideas = ctx.ideas.list(limit, offset).await?;
    Ok(ApiResponse::ok(ideas))
}

/// Fetch one idea
async fn get_idea(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<ApiResponse<Idea>>> {
    let idea = ctx
        .ideas
        .find_by_id(id)
        .await?
        .ok_or_else(|| PortalError::NotFound(format!("Idea {} not found", id)))?;
    Ok(ApiResponse::ok(idea))
}

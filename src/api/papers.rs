/// Research paper endpoints
///
/// Creation is direct (the submitting student owns the new paper); any
/// later mutation or deletion goes through the moderation workflow via
/// the change endpoints.
use crate::{
    api::ApiResponse,
    auth::AuthContext,
    context::AppContext,
    entities::Paper,
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
        .route("/api/papers", post(create_paper).get(list_papers))
        .route("/api/papers/mine", get(my_papers))
        .route("/api/papers/:id", get(get_paper))
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePaperRequest {
    #[validate(length(min = 1, max = 300))]
    title: String,
    #[serde(rename = "abstract")]
    #[validate(length(min = 1, max = 5000))]
    abstract_text: String,
    keywords: Option<String>,
    /// Id of the uploaded document in the blob store
    blob_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// Submit a research paper
async fn create_paper(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreatePaperRequest>,
) -> PortalResult<Json<ApiResponse<Paper>>> {
    req.validate()
        .map_err(|e| PortalError::Validation(e.to_string()))?;

    let paper = ctx
        .papers
        .create(
            auth.actor.id,
            &req.title,
            &req.abstract_text,
            req.keywords,
            req.blob_id,
        )
        .await?;

    Ok(ApiResponse::ok(paper))
}

/// List papers, newest first
async fn list_papers(
    State(ctx): State<AppContext>,
    Query(params): Query<ListParams>,
) -> PortalResult<Json<ApiResponse<Vec<Paper>>>> {
    let limit = params.limit.unwrap_or(50).min(100);
    let offset = params.offset.unwrap_or(0);
    let papers = ctx.papers.list(limit, offset).await?;
    Ok(ApiResponse::ok(papers))
}

/// Papers owned by the current actor
async fn my_papers(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<ApiResponse<Vec<Paper>>>> {
    let papers = ctx.papers.list_by_owner(auth.actor.id).await?;
    Ok(ApiResponse::ok(papers))
}

/// Fetch one paper
async fn get_paper(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> PortalResult<Json<ApiResponse<Paper>>> {
    let paper = ctx
        .papers
        .find_by_id(id)
        .await?
        .ok_or_else(|| PortalError::NotFound(format!("Paper {} not found", id)))?;
    Ok(ApiResponse::ok(paper))
}

/// HTTP API surface
///
/// Thin handlers over the context's services. Every response uses the
/// `{success, data}` envelope; errors convert through `PortalError`.

pub mod account;
pub mod admin;
pub mod ideas;
pub mod moderation;
pub mod papers;

use crate::context::AppContext;
use axum::{Json, Router};
use serde::Serialize;

/// Success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Build all API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(account::routes())
        .merge(papers::routes())
        .merge(ideas::routes())
        .merge(moderation::routes())
        .merge(admin::routes())
}

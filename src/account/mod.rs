/// Account and session management
///
/// Registration, login and session validation. The rest of the portal
/// consumes the validated session as an `Actor`; role checks live in the
/// access module.

mod manager;

pub use manager::AccountManager;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
    pub faculty: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Issued session
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub access_token: String,
}

/// A validated session attached to a request
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

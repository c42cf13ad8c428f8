/// User store
///
/// Accounts are created through the account manager; this store covers the
/// profile reads, role changes and deletion paths consumed by the
/// moderation workflow and the admin API.
use crate::access::{Actor, Role};
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Fields an approved profile update may touch
pub const PROFILE_FIELDS: &[&str] = &["full_name", "faculty"];

/// Fields an approved academic-year change may touch
pub const ACADEMIC_YEAR_FIELDS: &[&str] = &["academic_year"];

/// Portal user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub faculty: Option<String>,
    pub academic_year: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The actor identity this user acts as. An unrecognized role string
    /// yields `role: None`, which denies every capability.
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            email: self.email.clone(),
            role: Role::from_str(&self.role).ok(),
            faculty: self.faculty.clone(),
        }
    }
}

/// User store
#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: Uuid) -> PortalResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, full_name, password_hash, role, faculty, academic_year, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_user).transpose()
    }

    pub async fn list(&self, limit: i64, offset: i64) -> PortalResult<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, full_name, password_hash, role, faculty, academic_year, created_at
            FROM users
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_user).collect()
    }

    /// Change a user's role. The admin API is responsible for gating and
    /// auditing this.
    pub async fn set_role(&self, id: Uuid, role: Role) -> PortalResult<()> {
        let result = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id.to_string())
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::NotFound(format!("User {} not found", id)));
        }

        Ok(())
    }

    /// Account-deletion path; also used when an admin removes a user
    pub async fn delete(&self, id: Uuid) -> PortalResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::NotFound(format!("User {} not found", id)));
        }

        Ok(())
    }

    fn parse_user(row: sqlx::sqlite::SqliteRow) -> PortalResult<User> {
        let id_str: String = row.get("id");

        let created_at_str: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| PortalError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(User {
            id: Uuid::parse_str(&id_str)
                .map_err(|e| PortalError::Internal(format!("Invalid user id: {}", e)))?,
            email: row.get("email"),
            full_name: row.get("full_name"),
            password_hash: row.get("password_hash"),
            role: row.get("role"),
            faculty: row.get("faculty"),
            academic_year: row.get("academic_year"),
            created_at,
        })
    }
}

/// Snapshot a user's reviewable fields as JSON for audit capture
pub(crate) async fn snapshot(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> PortalResult<Option<serde_json::Value>> {
    let row = sqlx::query(
        "SELECT id, email, full_name, role, faculty, academic_year FROM users WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| {
        serde_json::json!({
            "id": row.get::<String, _>("id"),
            "email": row.get::<String, _>("email"),
            "full_name": row.get::<String, _>("full_name"),
            "role": row.get::<String, _>("role"),
            "faculty": row.get::<Option<String>, _>("faculty"),
            "academic_year": row.get::<Option<i64>, _>("academic_year"),
        })
    }))
}

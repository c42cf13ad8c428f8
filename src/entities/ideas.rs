/// Idea store
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Fields an approved idea update may touch
pub const UPDATABLE_FIELDS: &[&str] = &["title", "description"];

/// Submitted idea record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Idea store
#[derive(Clone)]
pub struct IdeaStore {
    db: SqlitePool,
}

impl IdeaStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, owner_id: Uuid, title: &str, description: &str) -> PortalResult<Idea> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO ideas (id, owner_id, title, description, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(owner_id.to_string())
        .bind(title)
        .bind(description)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Idea {
            id,
            owner_id,
            title: title.to_string(),
            description: description.to_string(),
            created_at: now,
        })
    }

    pub async fn find_by_id(&self, id: Uuid) -> PortalResult<Option<Idea>> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, description, created_at FROM ideas WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_idea).transpose()
    }

    pub async fn list(&self, limit: i64, offset: i64) -> PortalResult<Vec<Idea>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, title, description, created_at
            FROM ideas
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_idea).collect()
    }

    fn parse_idea(row: sqlx::sqlite::SqliteRow) -> PortalResult<Idea> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("owner_id");

        let created_at_str: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| PortalError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(Idea {
            id: Uuid::parse_str(&id_str)
                .map_err(|e| PortalError::Internal(format!("Invalid idea id: {}", e)))?,
            owner_id: Uuid::parse_str(&owner_str)
                .map_err(|e| PortalError::Internal(format!("Invalid owner id: {}", e)))?,
            title: row.get("title"),
            description: row.get("description"),
            created_at,
        })
    }
}

/// Snapshot an idea as JSON for audit capture
pub(crate) async fn snapshot(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> PortalResult<Option<serde_json::Value>> {
    let row = sqlx::query("SELECT id, owner_id, title, description FROM ideas WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|row| {
        serde_json::json!({
            "id": row.get::<String, _>("id"),
            "owner_id": row.get::<String, _>("owner_id"),
            "title": row.get::<String, _>("title"),
            "description": row.get::<String, _>("description"),
        })
    }))
}

/// Owner of an idea, if it exists
pub(crate) async fn owner_of(db: &SqlitePool, id: Uuid) -> PortalResult<Option<Uuid>> {
    let owner: Option<String> = sqlx::query_scalar("SELECT owner_id FROM ideas WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;

    owner
        .map(|s| {
            Uuid::parse_str(&s)
                .map_err(|e| PortalError::Internal(format!("Invalid owner id: {}", e)))
        })
        .transpose()
}

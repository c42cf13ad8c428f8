/// Research paper store
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Fields an approved paper update may touch
pub const UPDATABLE_FIELDS: &[&str] = &["title", "abstract", "keywords", "blob_id"];

/// Research paper record. The uploaded document lives in an opaque blob
/// store; only its id is kept here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Option<String>,
    pub blob_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Paper store
#[derive(Clone)]
pub struct PaperStore {
    db: SqlitePool,
}

impl PaperStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a paper owned by the submitting student
    pub async fn create(
        &self,
        owner_id: Uuid,
        title: &str,
        abstract_text: &str,
        keywords: Option<String>,
        blob_id: Option<String>,
    ) -> PortalResult<Paper> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO papers (id, owner_id, title, abstract, keywords, blob_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(owner_id.to_string())
        .bind(title)
        .bind(abstract_text)
        .bind(&keywords)
        .bind(&blob_id)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Paper {
            id,
            owner_id,
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            keywords,
            blob_id,
            created_at: now,
        })
    }

    pub async fn find_by_id(&self, id: Uuid) -> PortalResult<Option<Paper>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, title, abstract, keywords, blob_id, created_at
            FROM papers
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_paper).transpose()
    }

    pub async fn list_by_owner(&self, owner_id: Uuid) -> PortalResult<Vec<Paper>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, title, abstract, keywords, blob_id, created_at
            FROM papers
            WHERE owner_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_paper).collect()
    }

    pub async fn list(&self, limit: i64, offset: i64) -> PortalResult<Vec<Paper>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, title, abstract, keywords, blob_id, created_at
            FROM papers
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_paper).collect()
    }

    fn parse_paper(row: sqlx::sqlite::SqliteRow) -> PortalResult<Paper> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("owner_id");

        let created_at_str: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| PortalError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(Paper {
            id: Uuid::parse_str(&id_str)
                .map_err(|e| PortalError::Internal(format!("Invalid paper id: {}", e)))?,
            owner_id: Uuid::parse_str(&owner_str)
                .map_err(|e| PortalError::Internal(format!("Invalid owner id: {}", e)))?,
            title: row.get("title"),
            abstract_text: row.get("abstract"),
            keywords: row.get("keywords"),
            blob_id: row.get("blob_id"),
            created_at,
        })
    }
}

/// Snapshot a paper as JSON for audit before/after capture
pub(crate) async fn snapshot(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> PortalResult<Option<serde_json::Value>> {
    let row = sqlx::query(
        "SELECT id, owner_id, title, abstract, keywords, blob_id FROM papers WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| {
        serde_json::json!({
            "id": row.get::<String, _>("id"),
            "owner_id": row.get::<String, _>("owner_id"),
            "title": row.get::<String, _>("title"),
            "abstract": row.get::<String, _>("abstract"),
            "keywords": row.get::<Option<String>, _>("keywords"),
            "blob_id": row.get::<Option<String>, _>("blob_id"),
        })
    }))
}

/// Owner of a paper, if it exists
pub(crate) async fn owner_of(db: &SqlitePool, id: Uuid) -> PortalResult<Option<Uuid>> {
    let owner: Option<String> = sqlx::query_scalar("SELECT owner_id FROM papers WHERE id = ?")
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

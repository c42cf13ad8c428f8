/// Degree record store
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Fields an approved degree change may touch
pub const UPDATABLE_FIELDS: &[&str] = &["program", "level"];

/// Degree enrollment record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Degree {
    pub id: Uuid,
    pub user_id: Uuid,
    pub program: String,
    /// bachelor, master or phd
    pub level: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Degree store
#[derive(Clone)]
pub struct DegreeStore {
    db: SqlitePool,
}

impl DegreeStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: Uuid, program: &str, level: &str) -> PortalResult<Degree> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO degrees (id, user_id, program, level, enrolled_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(program)
        .bind(level)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Degree {
            id,
            user_id,
            program: program.to_string(),
            level: level.to_string(),
            enrolled_at: now,
        })
    }

    pub async fn find_by_id(&self, id: Uuid) -> PortalResult<Option<Degree>> {
        let row = sqlx::query(
            "SELECT id, user_id, program, level, enrolled_at FROM degrees WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_degree).transpose()
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> PortalResult<Vec<Degree>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, program, level, enrolled_at
            FROM degrees
            WHERE user_id = ?
            ORDER BY enrolled_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Self::parse_degree).collect()
    }

    fn parse_degree(row: sqlx::sqlite::SqliteRow) -> PortalResult<Degree> {
        let id_str: String = row.get("id");
        let user_str: String = row.get("user_id");

        let enrolled_at_str: String = row.get("enrolled_at");
        let enrolled_at = DateTime::parse_from_rfc3339(&enrolled_at_str)
            .map_err(|e| PortalError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(Degree {
            id: Uuid::parse_str(&id_str)
                .map_err(|e| PortalError::Internal(format!("Invalid degree id: {}", e)))?,
            user_id: Uuid::parse_str(&user_str)
                .map_err(|e| PortalError::Internal(format!("Invalid user id: {}", e)))?,
            program: row.get("program"),
            level: row.get("level"),
            enrolled_at,
        })
    }
}

/// Snapshot a degree record as JSON for audit capture
pub(crate) async fn snapshot(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> PortalResult<Option<serde_json::Value>> {
    let row = sqlx::query("SELECT id, user_id, program, level FROM degrees WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|row| {
        serde_json::json!({
            "id": row.get::<String, _>("id"),
            "user_id": row.get::<String, _>("user_id"),
            "program": row.get::<String, _>("program"),
            "level": row.get::<String, _>("level"),
        })
    }))
}

/// User a degree record belongs to, if it exists
pub(crate) async fn owner_of(db: &SqlitePool, id: Uuid) -> PortalResult<Option<Uuid>> {
    let owner: Option<String> = sqlx::query_scalar("SELECT user_id FROM degrees WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;

    owner
        .map(|s| {
            Uuid::parse_str(&s)
                .map_err(|e| PortalError::Internal(format!("Invalid user id: {}", e)))
        })
        .transpose()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) async fn create_table(db: &SqlitePool) {
        sqlx::query(
            r#"
            CREATE TABLE degrees (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                program TEXT NOT NULL,
                level TEXT NOT NULL,
                enrolled_at TEXT NOT NULL
            )
            "#,
        )
        .execute(db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_list_by_user() {
        let db = SqlitePool::connect(":memory:").await.unwrap();
        create_table(&db).await;

        let store = DegreeStore::new(db);
        let user = Uuid::new_v4();

        store.create(user, "Computer Science", "bachelor").await.unwrap();
        let degrees = store.list_by_user(user).await.unwrap();
        assert_eq!(degrees.len(), 1);
        assert_eq!(degrees[0].program, "Computer Science");
    }
}

/// Pending-change ledger
///
/// A proposed mutation (or deletion) is attached to its host entity as a
/// `PendingChange` instead of being applied directly. At most one open
/// change per host per change type: the insert races through a partial
/// unique index, so two concurrent proposals cannot both succeed. Once
/// resolved a record is immutable.
use crate::audit::{AuditAction, AuditResource};
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Kinds of change the moderation workflow understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    PaperUpdate,
    PaperDeletion,
    IdeaUpdate,
    IdeaDeletion,
    ProfileUpdate,
    AcademicYearChange,
    DegreeChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::PaperUpdate => "paper_update",
            ChangeType::PaperDeletion => "paper_deletion",
            ChangeType::IdeaUpdate => "idea_update",
            ChangeType::IdeaDeletion => "idea_deletion",
            ChangeType::ProfileUpdate => "profile_update",
            ChangeType::AcademicYearChange => "academic_year_change",
            ChangeType::DegreeChange => "degree_change",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s.to_lowercase().as_str() {
            "paper_update" => Ok(ChangeType::PaperUpdate),
            "paper_deletion" => Ok(ChangeType::PaperDeletion),
            "idea_update" => Ok(ChangeType::IdeaUpdate),
            "idea_deletion" => Ok(ChangeType::IdeaDeletion),
            "profile_update" => Ok(ChangeType::ProfileUpdate),
            "academic_year_change" => Ok(ChangeType::AcademicYearChange),
            "degree_change" => Ok(ChangeType::DegreeChange),
            _ => Err(PortalError::Validation(format!("Invalid change type: {}", s))),
        }
    }

    /// Deletion proposals carry no payload
    pub fn is_deletion(&self) -> bool {
        matches!(self, ChangeType::PaperDeletion | ChangeType::IdeaDeletion)
    }

    /// The kind of host entity this change targets
    pub fn host_resource(&self) -> AuditResource {
        match self {
            ChangeType::PaperUpdate | ChangeType::PaperDeletion => AuditResource::Paper,
            ChangeType::IdeaUpdate | ChangeType::IdeaDeletion => AuditResource::Idea,
            ChangeType::ProfileUpdate | ChangeType::AcademicYearChange => AuditResource::User,
            ChangeType::DegreeChange => AuditResource::Degree,
        }
    }

    /// Audit action recorded when a change of this type is applied
    pub fn applied_action(&self) -> AuditAction {
        match self {
            ChangeType::PaperUpdate => AuditAction::PaperUpdate,
            ChangeType::PaperDeletion => AuditAction::PaperDelete,
            ChangeType::IdeaUpdate => AuditAction::IdeaUpdate,
            ChangeType::IdeaDeletion => AuditAction::IdeaDelete,
            ChangeType::ProfileUpdate => AuditAction::ProfileUpdate,
            ChangeType::AcademicYearChange => AuditAction::AcademicYearChange,
            ChangeType::DegreeChange => AuditAction::DegreeChange,
        }
    }
}

/// Review status of a pending change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Approved => "approved",
            ChangeStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ChangeStatus::Pending),
            "approved" => Ok(ChangeStatus::Approved),
            "rejected" => Ok(ChangeStatus::Rejected),
            _ => Err(PortalError::Validation(format!("Invalid change status: {}", s))),
        }
    }
}

/// A proposal attached to a host entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: Uuid,
    pub host_id: Uuid,
    pub change_type: ChangeType,
    /// Partial field set merged on approval; absent for deletions
    pub payload: Option<serde_json::Value>,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
    pub status: ChangeStatus,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Pending-change ledger backed by the portal database
#[derive(Clone)]
pub struct PendingChangeLedger {
    db: SqlitePool,
}

impl PendingChangeLedger {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Attach a proposal to a host entity.
    ///
    /// The insert goes through a partial unique index on open changes, so
    /// a second proposal for the same host and change type fails with
    /// `Conflict` instead of silently overwriting the first.
    pub async fn propose(
        &self,
        host_id: Uuid,
        change_type: ChangeType,
        requested_by: Uuid,
        payload: Option<serde_json::Value>,
    ) -> PortalResult<PendingChange> {
        if change_type.is_deletion() && payload.is_some() {
            return Err(PortalError::Validation(
                "Deletion proposals must not carry a payload".to_string(),
            ));
        }
        if !change_type.is_deletion() && payload.is_none() {
            return Err(PortalError::Validation(
                "Update proposals require a payload".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let payload_json = payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PortalError::Internal(format!("Payload serialization: {}", e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO pending_changes
            (id, host_id, change_type, payload, requested_by, requested_at, status)
            VALUES (?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(id.to_string())
        .bind(host_id.to_string())
        .bind(change_type.as_str())
        .bind(payload_json)
        .bind(requested_by.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(PendingChange {
                id,
                host_id,
                change_type,
                payload,
                requested_by,
                requested_at: now,
                status: ChangeStatus::Pending,
                resolved_by: None,
                resolved_at: None,
                reason: None,
            }),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(PortalError::Conflict(format!(
                    "A {} change is already pending for this record; it must be reviewed first",
                    change_type.as_str()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a change by id
    pub async fn get(&self, change_id: Uuid) -> PortalResult<Option<PendingChange>> {
        let row = sqlx::query(
            r#"
            SELECT id, host_id, change_type, payload, requested_by, requested_at,
                   status, resolved_by, resolved_at, reason
            FROM pending_changes
            WHERE id = ?
            "#,
        )
        .bind(change_id.to_string())
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_change).transpose()
    }

    /// Get the open change for a host and change type, if any
    pub async fn open_change_for(
        &self,
        host_id: Uuid,
        change_type: ChangeType,
    ) -> PortalResult<Option<PendingChange>> {
        let row = sqlx::query(
            r#"
            SELECT id, host_id, change_type, payload, requested_by, requested_at,
                   status, resolved_by, resolved_at, reason
            FROM pending_changes
            WHERE host_id = ? AND change_type = ? AND status = 'pending'
            "#,
        )
        .bind(host_id.to_string())
        .bind(change_type.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.map(Self::parse_change).transpose()
    }

    /// List open changes, optionally restricted to one change type
    pub async fn list_pending(
        &self,
        change_type: Option<ChangeType>,
        limit: i64,
    ) -> PortalResult<Vec<PendingChange>> {
        let query = if let Some(change_type) = change_type {
            sqlx::query(
                r#"
                SELECT id, host_id, change_type, payload, requested_by, requested_at,
                       status, resolved_by, resolved_at, reason
                FROM pending_changes
                WHERE status = 'pending' AND change_type = ?
                ORDER BY requested_at ASC
                LIMIT ?
                "#,
            )
            .bind(change_type.as_str())
            .bind(limit)
        } else {
            sqlx::query(
                r#"
                SELECT id, host_id, change_type, payload, requested_by, requested_at,
                       status, resolved_by, resolved_at, reason
                FROM pending_changes
                WHERE status = 'pending'
                ORDER BY requested_at ASC
                LIMIT ?
                "#,
            )
            .bind(limit)
        };

        let rows = query.fetch_all(&self.db).await?;

        let mut changes = Vec::with_capacity(rows.len());
        for row in rows {
            changes.push(Self::parse_change(row)?);
        }

        Ok(changes)
    }

    /// Transition a change from pending to a terminal status.
    ///
    /// Returns the resolved record. Resolving an already-resolved change
    /// fails with `InvalidState`; the conditional update keyed on the
    /// current `pending` status makes two concurrent resolutions mutually
    /// exclusive.
    pub async fn resolve(
        &self,
        change_id: Uuid,
        outcome: ChangeStatus,
        resolved_by: Uuid,
        reason: Option<String>,
    ) -> PortalResult<PendingChange> {
        let mut conn = self.db.acquire().await?;
        Self::claim(&mut conn, change_id, outcome, resolved_by, reason).await?;
        drop(conn);

        self.get(change_id)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("Pending change {} not found", change_id)))
    }

    /// Conditional status update on an explicit connection so the
    /// moderation workflow can run it inside the same transaction as the
    /// host mutation.
    pub(crate) async fn claim(
        conn: &mut SqliteConnection,
        change_id: Uuid,
        outcome: ChangeStatus,
        resolved_by: Uuid,
        reason: Option<String>,
    ) -> PortalResult<()> {
        if outcome == ChangeStatus::Pending {
            return Err(PortalError::Validation(
                "A change can only be resolved to approved or rejected".to_string(),
            ));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE pending_changes
            SET status = ?,
                resolved_by = ?,
                resolved_at = ?,
                reason = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(outcome.as_str())
        .bind(resolved_by.to_string())
        .bind(now.to_rfc3339())
        .bind(&reason)
        .bind(change_id.to_string())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM pending_changes WHERE id = ?")
                    .bind(change_id.to_string())
                    .fetch_optional(&mut *conn)
                    .await?;

            return match status {
                Some(status) => Err(PortalError::InvalidState(format!(
                    "Change {} is already {}",
                    change_id, status
                ))),
                None => Err(PortalError::NotFound(format!(
                    "Pending change {} not found",
                    change_id
                ))),
            };
        }

        Ok(())
    }

    fn parse_change(row: sqlx::sqlite::SqliteRow) -> PortalResult<PendingChange> {
        let id_str: String = row.get("id");
        let host_id_str: String = row.get("host_id");
        let requested_by_str: String = row.get("requested_by");

        let change_type_str: String = row.get("change_type");
        let change_type = ChangeType::from_str(&change_type_str)?;

        let status_str: String = row.get("status");
        let status = ChangeStatus::from_str(&status_str)?;

        let payload = row
            .try_get::<Option<String>, _>("payload")
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok());

        let requested_at_str: String = row.get("requested_at");
        let requested_at = DateTime::parse_from_rfc3339(&requested_at_str)
            .map_err(|e| PortalError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        let resolved_at = row
            .try_get::<Option<String>, _>("resolved_at")
            .ok()
            .flatten()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let resolved_by = row
            .try_get::<Option<String>, _>("resolved_by")
            .ok()
            .flatten()
            .and_then(|s| Uuid::parse_str(&s).ok());

        Ok(PendingChange {
            id: Uuid::parse_str(&id_str)
                .map_err(|e| PortalError::Internal(format!("Invalid change id: {}", e)))?,
            host_id: Uuid::parse_str(&host_id_str)
                .map_err(|e| PortalError::Internal(format!("Invalid host id: {}", e)))?,
            change_type,
            payload,
            requested_by: Uuid::parse_str(&requested_by_str)
                .map_err(|e| PortalError::Internal(format!("Invalid requester id: {}", e)))?,
            requested_at,
            status,
            resolved_by,
            resolved_at,
            reason: row.get("reason"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) async fn test_pool() -> SqlitePool {
        // Single connection: every pooled connection to :memory: is a
        // separate database
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();

        sqlx::query(
            r#"
            CREATE TABLE pending_changes (
                id TEXT PRIMARY KEY,
                host_id TEXT NOT NULL,
                change_type TEXT NOT NULL,
                payload TEXT,
                requested_by TEXT NOT NULL,
                requested_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                resolved_by TEXT,
                resolved_at TEXT,
                reason TEXT
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        sqlx::query(
            "CREATE UNIQUE INDEX idx_pending_changes_open
             ON pending_changes (host_id, change_type) WHERE status = 'pending'",
        )
        .execute(&db)
        .await
        .unwrap();

        db
    }

    #[tokio::test]
    async fn test_propose_and_get() {
        let ledger = PendingChangeLedger::new(test_pool().await);
        let host = Uuid::new_v4();
        let requester = Uuid::new_v4();

        let change = ledger
            .propose(
                host,
                ChangeType::PaperUpdate,
                requester,
                Some(json!({"title": "Revised Title"})),
            )
            .await
            .unwrap();

        assert_eq!(change.status, ChangeStatus::Pending);
        assert_eq!(change.host_id, host);

        let fetched = ledger.get(change.id).await.unwrap().unwrap();
        assert_eq!(fetched.payload, Some(json!({"title": "Revised Title"})));
    }

    #[tokio::test]
    async fn test_second_proposal_conflicts() {
        let ledger = PendingChangeLedger::new(test_pool().await);
        let host = Uuid::new_v4();
        let requester = Uuid::new_v4();

        ledger
            .propose(host, ChangeType::PaperUpdate, requester, Some(json!({"title": "a"})))
            .await
            .unwrap();

        let second = ledger
            .propose(host, ChangeType::PaperUpdate, requester, Some(json!({"title": "b"})))
            .await;

        assert!(matches!(second, Err(PortalError::Conflict(_))));

        // A different change type on the same host is fine
        ledger
            .propose(host, ChangeType::PaperDeletion, requester, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_propose_again_after_resolution() {
        let ledger = PendingChangeLedger::new(test_pool().await);
        let host = Uuid::new_v4();
        let requester = Uuid::new_v4();
        let reviewer = Uuid::new_v4();

        let change = ledger
            .propose(host, ChangeType::ProfileUpdate, requester, Some(json!({"bio": "x"})))
            .await
            .unwrap();

        ledger
            .resolve(change.id, ChangeStatus::Rejected, reviewer, None)
            .await
            .unwrap();

        // The slot is open again once the first change is terminal
        ledger
            .propose(host, ChangeType::ProfileUpdate, requester, Some(json!({"bio": "y"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_is_terminal() {
        let ledger = PendingChangeLedger::new(test_pool().await);
        let host = Uuid::new_v4();
        let reviewer = Uuid::new_v4();

        let change = ledger
            .propose(host, ChangeType::IdeaUpdate, Uuid::new_v4(), Some(json!({"t": 1})))
            .await
            .unwrap();

        let resolved = ledger
            .resolve(
                change.id,
                ChangeStatus::Approved,
                reviewer,
                Some("looks good".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, ChangeStatus::Approved);
        assert_eq!(resolved.resolved_by, Some(reviewer));

        let again = ledger
            .resolve(change.id, ChangeStatus::Rejected, reviewer, None)
            .await;
        assert!(matches!(again, Err(PortalError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_resolve_unknown_change() {
        let ledger = PendingChangeLedger::new(test_pool().await);

        let missing = ledger
            .resolve(Uuid::new_v4(), ChangeStatus::Approved, Uuid::new_v4(), None)
            .await;
        assert!(matches!(missing, Err(PortalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_to_pending_rejected() {
        let ledger = PendingChangeLedger::new(test_pool().await);

        let change = ledger
            .propose(Uuid::new_v4(), ChangeType::DegreeChange, Uuid::new_v4(), Some(json!({})))
            .await
            .unwrap();

        let err = ledger
            .resolve(change.id, ChangeStatus::Pending, Uuid::new_v4(), None)
            .await;
        assert!(matches!(err, Err(PortalError::Validation(_))));
    }

    #[tokio::test]
    async fn test_deletion_payload_rules() {
        let ledger = PendingChangeLedger::new(test_pool().await);

        let with_payload = ledger
            .propose(Uuid::new_v4(), ChangeType::PaperDeletion, Uuid::new_v4(), Some(json!({})))
            .await;
        assert!(matches!(with_payload, Err(PortalError::Validation(_))));

        let without_payload = ledger
            .propose(Uuid::new_v4(), ChangeType::PaperUpdate, Uuid::new_v4(), None)
            .await;
        assert!(matches!(without_payload, Err(PortalError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_pending_filters_by_type() {
        let ledger = PendingChangeLedger::new(test_pool().await);

        ledger
            .propose(Uuid::new_v4(), ChangeType::PaperUpdate, Uuid::new_v4(), Some(json!({})))
            .await
            .unwrap();
        ledger
            .propose(Uuid::new_v4(), ChangeType::IdeaDeletion, Uuid::new_v4(), None)
            .await
            .unwrap();

        let all = ledger.list_pending(None, 50).await.unwrap();
        assert_eq!(all.len(), 2);

        let papers = ledger
            .list_pending(Some(ChangeType::PaperUpdate), 50)
            .await
            .unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].change_type, ChangeType::PaperUpdate);
    }

    #[tokio::test]
    async fn test_concurrent_proposals_one_wins() {
        let ledger = PendingChangeLedger::new(test_pool().await);
        let host = Uuid::new_v4();

        let a = ledger.propose(host, ChangeType::AcademicYearChange, Uuid::new_v4(), Some(json!({"year": 3})));
        let b = ledger.propose(host, ChangeType::AcademicYearChange, Uuid::new_v4(), Some(json!({"year": 4})));

        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1, "exactly one proposal must win");

        let open = ledger.list_pending(None, 10).await.unwrap();
        assert_eq!(open.len(), 1);
    }
}

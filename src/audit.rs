/// Append-only audit trail
///
/// Every sensitive action (including denied attempts) is recorded here.
/// Entries are stamped server-side and never updated or deleted by any
/// application path. Write failures are swallowed and reported on the
/// tracing channel so audit logging never fails the primary operation.
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, SqlitePool};
use uuid::Uuid;

/// Audited action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ChangeProposed,
    ChangeProposalFailed,
    ChangeRejected,
    PaperUpdate,
    PaperDelete,
    IdeaUpdate,
    IdeaDelete,
    ProfileUpdate,
    AcademicYearChange,
    DegreeChange,
    UnauthorizedAttempt,
    RoleGranted,
    RoleRevoked,
    UserDeleted,
    AccountRegistered,
    Login,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ChangeProposed => "CHANGE_PROPOSED",
            AuditAction::ChangeProposalFailed => "CHANGE_PROPOSAL_FAILED",
            AuditAction::ChangeRejected => "CHANGE_REJECTED",
            AuditAction::PaperUpdate => "PAPER_UPDATE",
            AuditAction::PaperDelete => "PAPER_DELETE",
            AuditAction::IdeaUpdate => "IDEA_UPDATE",
            AuditAction::IdeaDelete => "IDEA_DELETE",
            AuditAction::ProfileUpdate => "PROFILE_UPDATE",
            AuditAction::AcademicYearChange => "ACADEMIC_YEAR_CHANGE",
            AuditAction::DegreeChange => "DEGREE_CHANGE",
            AuditAction::UnauthorizedAttempt => "UNAUTHORIZED_ATTEMPT",
            AuditAction::RoleGranted => "ROLE_GRANTED",
            AuditAction::RoleRevoked => "ROLE_REVOKED",
            AuditAction::UserDeleted => "USER_DELETED",
            AuditAction::AccountRegistered => "ACCOUNT_REGISTERED",
            AuditAction::Login => "LOGIN",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s {
            "CHANGE_PROPOSED" => Ok(AuditAction::ChangeProposed),
            "CHANGE_PROPOSAL_FAILED" => Ok(AuditAction::ChangeProposalFailed),
            "CHANGE_REJECTED" => Ok(AuditAction::ChangeRejected),
            "PAPER_UPDATE" => Ok(AuditAction::PaperUpdate),
            "PAPER_DELETE" => Ok(AuditAction::PaperDelete),
            "IDEA_UPDATE" => Ok(AuditAction::IdeaUpdate),
            "IDEA_DELETE" => Ok(AuditAction::IdeaDelete),
            "PROFILE_UPDATE" => Ok(AuditAction::ProfileUpdate),
            "ACADEMIC_YEAR_CHANGE" => Ok(AuditAction::AcademicYearChange),
            "DEGREE_CHANGE" => Ok(AuditAction::DegreeChange),
            "UNAUTHORIZED_ATTEMPT" => Ok(AuditAction::UnauthorizedAttempt),
            "ROLE_GRANTED" => Ok(AuditAction::RoleGranted),
            "ROLE_REVOKED" => Ok(AuditAction::RoleRevoked),
            "USER_DELETED" => Ok(AuditAction::UserDeleted),
            "ACCOUNT_REGISTERED" => Ok(AuditAction::AccountRegistered),
            "LOGIN" => Ok(AuditAction::Login),
            _ => Err(PortalError::Validation(format!("Invalid audit action: {}", s))),
        }
    }
}

/// Resource kinds an audit entry can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResource {
    Paper,
    User,
    Degree,
    Idea,
    PendingChange,
    Role,
}

impl AuditResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResource::Paper => "paper",
            AuditResource::User => "user",
            AuditResource::Degree => "degree",
            AuditResource::Idea => "idea",
            AuditResource::PendingChange => "pending_change",
            AuditResource::Role => "role",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(AuditResource::Paper),
            "user" => Ok(AuditResource::User),
            "degree" => Ok(AuditResource::Degree),
            "idea" => Ok(AuditResource::Idea),
            "pending_change" => Ok(AuditResource::PendingChange),
            "role" => Ok(AuditResource::Role),
            _ => Err(PortalError::Validation(format!("Invalid audit resource: {}", s))),
        }
    }
}

/// Structured detail payloads, one shape per kind of event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDetails {
    Proposal {
        change_type: String,
        payload: Option<serde_json::Value>,
    },
    ProposalFailed {
        change_type: String,
        reason: String,
    },
    Approval {
        change_id: Uuid,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    },
    Rejection {
        change_id: Uuid,
        reason: Option<String>,
    },
    Denied {
        attempted: String,
        required: String,
        actual_role: String,
    },
    RoleChange {
        subject_id: Uuid,
        role: String,
        notes: Option<String>,
    },
}

/// Immutable audit record as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub actor_id: Uuid,
    pub actor_email: String,
    pub actor_role: String,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub details: Option<AuditDetails>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// What a caller submits; the timestamp is stamped server-side
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Uuid,
    pub actor_email: String,
    pub actor_role: String,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub details: Option<AuditDetails>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEvent {
    pub fn new(
        actor: &crate::access::Actor,
        action: AuditAction,
        resource: AuditResource,
    ) -> Self {
        Self {
            actor_id: actor.id,
            actor_email: actor.email.clone(),
            actor_role: actor.role_str().to_string(),
            action,
            resource,
            resource_id: None,
            details: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn details(mut self, details: AuditDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn request_meta(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }
}

/// Filters for querying the trail
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource: Option<AuditResource>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Audit log sink
#[derive(Clone)]
pub struct AuditLogSink {
    db: SqlitePool,
}

impl AuditLogSink {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append an entry. Never fails the caller: storage errors go to the
    /// diagnostic channel and the primary operation proceeds.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.try_record(&event).await {
            tracing::error!(
                action = event.action.as_str(),
                actor = %event.actor_id,
                "audit write failed: {}",
                e
            );
        }
    }

    async fn try_record(&self, event: &AuditEvent) -> PortalResult<()> {
        let now = Utc::now();
        let details = event
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PortalError::Internal(format!("Audit details serialization: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs
            (actor_id, actor_email, actor_role, action, resource, resource_id, details, ip_address, user_agent, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.actor_id.to_string())
        .bind(&event.actor_email)
        .bind(&event.actor_role)
        .bind(event.action.as_str())
        .bind(event.resource.as_str())
        .bind(&event.resource_id)
        .bind(details)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Query entries newest-first with optional filters and limit/offset
    /// pagination. On storage failure returns an empty set rather than
    /// propagating the error.
    pub async fn query(&self, filter: AuditQuery) -> Vec<AuditLogEntry> {
        match self.try_query(&filter).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("audit query failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_query(&self, filter: &AuditQuery) -> PortalResult<Vec<AuditLogEntry>> {
        let mut builder = QueryBuilder::new(
            "SELECT id, actor_id, actor_email, actor_role, action, resource, \
             resource_id, details, ip_address, user_agent, timestamp \
             FROM audit_logs WHERE 1 = 1",
        );

        if let Some(actor_id) = filter.actor_id {
            builder.push(" AND actor_id = ").push_bind(actor_id.to_string());
        }
        if let Some(action) = filter.action {
            builder.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(resource) = filter.resource {
            builder.push(" AND resource = ").push_bind(resource.as_str());
        }
        if let Some(start) = filter.start {
            builder.push(" AND timestamp >= ").push_bind(start.to_rfc3339());
        }
        if let Some(end) = filter.end {
            builder.push(" AND timestamp <= ").push_bind(end.to_rfc3339());
        }

        builder.push(" ORDER BY timestamp DESC, id DESC");
        builder.push(" LIMIT ").push_bind(filter.limit.unwrap_or(100));
        builder.push(" OFFSET ").push_bind(filter.offset.unwrap_or(0));

        let rows = builder.build().fetch_all(&self.db).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(Self::parse_entry(row)?);
        }

        Ok(entries)
    }

    fn parse_entry(row: sqlx::sqlite::SqliteRow) -> PortalResult<AuditLogEntry> {
        let actor_id_str: String = row.get("actor_id");
        let actor_id = Uuid::parse_str(&actor_id_str)
            .map_err(|e| PortalError::Internal(format!("Invalid actor id: {}", e)))?;

        let action_str: String = row.get("action");
        let action = AuditAction::from_str(&action_str)?;

        let resource_str: String = row.get("resource");
        let resource = AuditResource::from_str(&resource_str)?;

        let details = row
            .try_get::<Option<String>, _>("details")
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok());

        let timestamp_str: String = row.get("timestamp");
        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| PortalError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        Ok(AuditLogEntry {
            id: row.get("id"),
            actor_id,
            actor_email: row.get("actor_email"),
            actor_role: row.get("actor_role"),
            action,
            resource,
            resource_id: row.get("resource_id"),
            details,
            ip_address: row.get("ip_address"),
            user_agent: row.get("user_agent"),
            timestamp,
        })
    }
}

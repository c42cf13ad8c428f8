/// Moderation workflow
///
/// Orchestrates the pending-change lifecycle: an owner submits a proposal,
/// a reviewer with the matching capability approves or rejects it. On
/// approval the host mutation and the ledger resolution commit in one
/// transaction, so a failed host write leaves the change pending and
/// retryable. Every transition, including denied attempts, lands in the
/// audit trail; audit failures never block the transition itself.
use crate::access::{self, Actor, Capability};
use crate::audit::{AuditAction, AuditDetails, AuditEvent, AuditLogSink};
use crate::entities;
use crate::error::{PortalError, PortalResult};
use crate::ledger::{ChangeStatus, ChangeType, PendingChange, PendingChangeLedger};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Request-level metadata carried into audit entries
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// The capability required to review a given change type
pub fn review_capability(change_type: ChangeType) -> Capability {
    match change_type {
        ChangeType::PaperUpdate | ChangeType::PaperDeletion => Capability::ReviewPaperChanges,
        ChangeType::IdeaUpdate | ChangeType::IdeaDeletion => Capability::ReviewIdeaChanges,
        ChangeType::ProfileUpdate => Capability::ReviewProfileChanges,
        ChangeType::AcademicYearChange => Capability::ReviewAcademicYearChanges,
        ChangeType::DegreeChange => Capability::ReviewDegreeChanges,
    }
}

/// Moderation workflow over the ledger, the entity stores and the audit sink
#[derive(Clone)]
pub struct ModerationWorkflow {
    db: SqlitePool,
    ledger: PendingChangeLedger,
    audit: AuditLogSink,
}

impl ModerationWorkflow {
    pub fn new(db: SqlitePool, ledger: PendingChangeLedger, audit: AuditLogSink) -> Self {
        Self { db, ledger, audit }
    }

    pub fn ledger(&self) -> &PendingChangeLedger {
        &self.ledger
    }

    /// Submit a change proposal against a host entity.
    ///
    /// The actor must own the host, or hold the review capability for this
    /// change type. Every attempt lands in the audit trail, failures
    /// included: denials as `UnauthorizedAttempt`, a missing host or a
    /// collision with an open change as `ChangeProposalFailed`.
    pub async fn submit_change(
        &self,
        actor: &Actor,
        change_type: ChangeType,
        host_id: Uuid,
        payload: Option<serde_json::Value>,
        meta: RequestMeta,
    ) -> PortalResult<PendingChange> {
        let owner = match self.host_owner(change_type, host_id).await? {
            Some(owner) => owner,
            None => {
                let err = PortalError::NotFound(format!(
                    "{} {} not found",
                    change_type.host_resource().as_str(),
                    host_id
                ));
                self.audit_proposal_failure(actor, change_type, host_id, &err, &meta)
                    .await;
                return Err(err);
            }
        };

        let permitted = actor.id == owner
            || access::evaluate(actor, review_capability(change_type));
        if !permitted {
            self.audit
                .record(
                    AuditEvent::new(actor, AuditAction::UnauthorizedAttempt, change_type.host_resource())
                        .resource_id(host_id)
                        .details(AuditDetails::Denied {
                            attempted: format!("propose {}", change_type.as_str()),
                            required: "ownership of the record".to_string(),
                            actual_role: actor.role_str().to_string(),
                        })
                        .request_meta(meta.ip_address, meta.user_agent),
                )
                .await;

            return Err(PortalError::Authorization(
                "Only the owner of this record may request changes to it".to_string(),
            ));
        }

        let change = match self
            .ledger
            .propose(host_id, change_type, actor.id, payload.clone())
            .await
        {
            Ok(change) => change,
            Err(err) => {
                self.audit_proposal_failure(actor, change_type, host_id, &err, &meta)
                    .await;
                return Err(err);
            }
        };

        self.audit
            .record(
                AuditEvent::new(actor, AuditAction::ChangeProposed, change_type.host_resource())
                    .resource_id(host_id)
                    .details(AuditDetails::Proposal {
                        change_type: change_type.as_str().to_string(),
                        payload,
                    })
                    .request_meta(meta.ip_address, meta.user_agent),
            )
            .await;

        Ok(change)
    }

    /// Record a proposal attempt that never reached the ledger (missing
    /// host, payload rejected, or a collision with an open change)
    async fn audit_proposal_failure(
        &self,
        actor: &Actor,
        change_type: ChangeType,
        host_id: Uuid,
        err: &PortalError,
        meta: &RequestMeta,
    ) {
        self.audit
            .record(
                AuditEvent::new(
                    actor,
                    AuditAction::ChangeProposalFailed,
                    change_type.host_resource(),
                )
                .resource_id(host_id)
                .details(AuditDetails::ProposalFailed {
                    change_type: change_type.as_str().to_string(),
                    reason: err.to_string(),
                })
                .request_meta(meta.ip_address.clone(), meta.user_agent.clone()),
            )
            .await;
    }

    /// Approve a pending change: mutate the host and close the ledger
    /// entry in one transaction, then audit with before/after snapshots.
    pub async fn approve_change(
        &self,
        reviewer: &Actor,
        change_id: Uuid,
        meta: RequestMeta,
    ) -> PortalResult<PendingChange> {
        let change = self
            .ledger
            .get(change_id)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("Pending change {} not found", change_id)))?;

        self.gate_reviewer(reviewer, &change, "approve", &meta).await?;

        let mut tx = self.db.begin().await?;

        let before = Self::snapshot_host(&mut tx, change.change_type, change.host_id).await?;

        // Claim the ledger row first: of two concurrent approvals only one
        // sees the pending status
        PendingChangeLedger::claim(
            &mut tx,
            change.id,
            ChangeStatus::Approved,
            reviewer.id,
            None,
        )
        .await?;

        Self::apply_host_mutation(&mut tx, &change).await?;

        let after = if change.change_type.is_deletion() {
            None
        } else {
            Self::snapshot_host(&mut tx, change.change_type, change.host_id).await?
        };

        tx.commit().await?;

        self.audit
            .record(
                AuditEvent::new(
                    reviewer,
                    change.change_type.applied_action(),
                    change.change_type.host_resource(),
                )
                .resource_id(change.host_id)
                .details(AuditDetails::Approval {
                    change_id: change.id,
                    before,
                    after,
                })
                .request_meta(meta.ip_address, meta.user_agent),
            )
            .await;

        self.ledger
            .get(change.id)
            .await?
            .ok_or_else(|| PortalError::Internal("Resolved change disappeared".to_string()))
    }

    /// Reject a pending change, leaving the host entity untouched
    pub async fn reject_change(
        &self,
        reviewer: &Actor,
        change_id: Uuid,
        reason: Option<String>,
        meta: RequestMeta,
    ) -> PortalResult<PendingChange> {
        let change = self
            .ledger
            .get(change_id)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("Pending change {} not found", change_id)))?;

        self.gate_reviewer(reviewer, &change, "reject", &meta).await?;

        let resolved = self
            .ledger
            .resolve(change.id, ChangeStatus::Rejected, reviewer.id, reason.clone())
            .await?;

        self.audit
            .record(
                AuditEvent::new(reviewer, AuditAction::ChangeRejected, change.change_type.host_resource())
                    .resource_id(change.host_id)
                    .details(AuditDetails::Rejection {
                        change_id: change.id,
                        reason,
                    })
                    .request_meta(meta.ip_address, meta.user_agent),
            )
            .await;

        Ok(resolved)
    }

    /// Open changes awaiting review, for actors holding the queue capability
    pub async fn pending_queue(
        &self,
        reviewer: &Actor,
        change_type: Option<ChangeType>,
        limit: i64,
    ) -> PortalResult<Vec<PendingChange>> {
        if !access::evaluate(reviewer, Capability::ViewModerationQueue) {
            return Err(PortalError::Authorization(
                "Viewing the moderation queue requires a reviewer role".to_string(),
            ));
        }

        self.ledger.list_pending(change_type, limit).await
    }

    /// Deny and audit a reviewer who lacks the capability for this change
    async fn gate_reviewer(
        &self,
        reviewer: &Actor,
        change: &PendingChange,
        verb: &str,
        meta: &RequestMeta,
    ) -> PortalResult<()> {
        let required = review_capability(change.change_type);
        if access::evaluate(reviewer, required) {
            return Ok(());
        }

        self.audit
            .record(
                AuditEvent::new(
                    reviewer,
                    AuditAction::UnauthorizedAttempt,
                    change.change_type.host_resource(),
                )
                .resource_id(change.host_id)
                .details(AuditDetails::Denied {
                    attempted: format!("{} {}", verb, change.change_type.as_str()),
                    required: required.as_str().to_string(),
                    actual_role: reviewer.role_str().to_string(),
                })
                .request_meta(meta.ip_address.clone(), meta.user_agent.clone()),
            )
            .await;

        Err(PortalError::Authorization(format!(
            "Reviewing {} changes requires a role with the {} capability",
            change.change_type.as_str(),
            required.as_str()
        )))
    }

    /// Who owns the host entity of a change, or None if the host is gone
    async fn host_owner(
        &self,
        change_type: ChangeType,
        host_id: Uuid,
    ) -> PortalResult<Option<Uuid>> {
        use crate::audit::AuditResource;

        match change_type.host_resource() {
            AuditResource::Paper => entities::papers::owner_of(&self.db, host_id).await,
            AuditResource::Idea => entities::ideas::owner_of(&self.db, host_id).await,
            AuditResource::Degree => entities::degrees::owner_of(&self.db, host_id).await,
            // Profile and academic-year changes host on the user itself
            AuditResource::User => {
                let exists: Option<String> =
                    sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
                        .bind(host_id.to_string())
                        .fetch_optional(&self.db)
                        .await?;
                Ok(exists.map(|_| host_id))
            }
            _ => Ok(None),
        }
    }

    async fn snapshot_host(
        conn: &mut SqliteConnection,
        change_type: ChangeType,
        host_id: Uuid,
    ) -> PortalResult<Option<serde_json::Value>> {
        use crate::audit::AuditResource;

        match change_type.host_resource() {
            AuditResource::Paper => entities::papers::snapshot(conn, host_id).await,
            AuditResource::Idea => entities::ideas::snapshot(conn, host_id).await,
            AuditResource::User => entities::users::snapshot(conn, host_id).await,
            AuditResource::Degree => entities::degrees::snapshot(conn, host_id).await,
            _ => Ok(None),
        }
    }

    async fn apply_host_mutation(
        conn: &mut SqliteConnection,
        change: &PendingChange,
    ) -> PortalResult<()> {
        let payload = || {
            change.payload.as_ref().ok_or_else(|| {
                PortalError::Internal("Update proposal has no payload".to_string())
            })
        };

        match change.change_type {
            ChangeType::PaperUpdate => {
                entities::apply_partial_update(
                    conn,
                    "papers",
                    entities::papers::UPDATABLE_FIELDS,
                    change.host_id,
                    payload()?,
                )
                .await
            }
            ChangeType::PaperDeletion => {
                entities::apply_delete(conn, "papers", change.host_id).await
            }
            ChangeType::IdeaUpdate => {
                entities::apply_partial_update(
                    conn,
                    "ideas",
                    entities::ideas::UPDATABLE_FIELDS,
                    change.host_id,
                    payload()?,
                )
                .await
            }
            ChangeType::IdeaDeletion => {
                entities::apply_delete(conn, "ideas", change.host_id).await
            }
            ChangeType::ProfileUpdate => {
                entities::apply_partial_update(
                    conn,
                    "users",
                    entities::users::PROFILE_FIELDS,
                    change.host_id,
                    payload()?,
                )
                .await
            }
            ChangeType::AcademicYearChange => {
                entities::apply_partial_update(
                    conn,
                    "users",
                    entities::users::ACADEMIC_YEAR_FIELDS,
                    change.host_id,
                    payload()?,
                )
                .await
            }
            ChangeType::DegreeChange => {
                entities::apply_partial_update(
                    conn,
                    "degrees",
                    entities::degrees::UPDATABLE_FIELDS,
                    change.host_id,
                    payload()?,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::audit::{AuditQuery, AuditResource};
    use crate::entities::{papers, users, PaperStore, UserStore};
    use serde_json::json;

    async fn test_db() -> SqlitePool {
        let db = SqlitePool::connect(":memory:").await.unwrap();

        users::tests::create_table(&db).await;
        papers::tests::create_table(&db).await;
        crate::entities::ideas::tests::create_table(&db).await;
        crate::entities::degrees::tests::create_table(&db).await;

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

        sqlx::query(
            r#"
            CREATE TABLE audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                actor_id TEXT NOT NULL,
                actor_email TEXT NOT NULL,
                actor_role TEXT NOT NULL,
                action TEXT NOT NULL,
                resource TEXT NOT NULL,
                resource_id TEXT,
                details TEXT,
                ip_address TEXT,
                user_agent TEXT,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        db
    }

    fn workflow(db: &SqlitePool) -> (ModerationWorkflow, AuditLogSink) {
        let audit = AuditLogSink::new(db.clone());
        let workflow = ModerationWorkflow::new(
            db.clone(),
            PendingChangeLedger::new(db.clone()),
            audit.clone(),
        );
        (workflow, audit)
    }

    #[tokio::test]
    async fn test_propose_approve_mutates_host_once() {
        let db = test_db().await;
        let (workflow, audit) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;
        let admin = users::tests::insert_user(&db, Role::Admin).await;

        let paper = PaperStore::new(db.clone())
            .create(student.id, "Old Title", "A.", None, None)
            .await
            .unwrap();

        let change = workflow
            .submit_change(
                &student.actor(),
                ChangeType::PaperUpdate,
                paper.id,
                Some(json!({"title": "New Title"})),
                RequestMeta::default(),
            )
            .await
            .unwrap();
        assert_eq!(change.status, ChangeStatus::Pending);

        let approved = workflow
            .approve_change(&admin.actor(), change.id, RequestMeta::default())
            .await
            .unwrap();
        assert_eq!(approved.status, ChangeStatus::Approved);

        let updated = PaperStore::new(db.clone())
            .find_by_id(paper.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "New Title");

        // Exactly one applied-change entry
        let entries = audit
            .query(AuditQuery {
                action: Some(AuditAction::PaperUpdate),
                ..Default::default()
            })
            .await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource, AuditResource::Paper);

        // Second approval is a state error and does not re-apply
        let again = workflow
            .approve_change(&admin.actor(), change.id, RequestMeta::default())
            .await;
        assert!(matches!(again, Err(PortalError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_non_owner_cannot_propose() {
        let db = test_db().await;
        let (workflow, audit) = workflow(&db);

        let owner = users::tests::insert_user(&db, Role::Student).await;
        let intruder = users::tests::insert_user(&db, Role::Student).await;

        let paper = PaperStore::new(db.clone())
            .create(owner.id, "Mine", "A.", None, None)
            .await
            .unwrap();

        let err = workflow
            .submit_change(
                &intruder.actor(),
                ChangeType::PaperDeletion,
                paper.id,
                None,
                RequestMeta::default(),
            )
            .await;
        assert!(matches!(err, Err(PortalError::Authorization(_))));

        // Paper untouched, denial audited
        assert!(PaperStore::new(db.clone())
            .find_by_id(paper.id)
            .await
            .unwrap()
            .is_some());

        let denied = audit
            .query(AuditQuery {
                action: Some(AuditAction::UnauthorizedAttempt),
                ..Default::default()
            })
            .await;
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].actor_id, intruder.id);
    }

    #[tokio::test]
    async fn test_reject_leaves_host_untouched() {
        let db = test_db().await;
        let (workflow, audit) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;
        let moderator = users::tests::insert_user(&db, Role::Moderator).await;

        let paper = PaperStore::new(db.clone())
            .create(student.id, "Keep Me", "Original abstract.", None, None)
            .await
            .unwrap();

        let change = workflow
            .submit_change(
                &student.actor(),
                ChangeType::PaperDeletion,
                paper.id,
                None,
                RequestMeta::default(),
            )
            .await
            .unwrap();

        let rejected = workflow
            .reject_change(
                &moderator.actor(),
                change.id,
                Some("insufficient justification".to_string()),
                RequestMeta::default(),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, ChangeStatus::Rejected);
        assert_eq!(rejected.reason.as_deref(), Some("insufficient justification"));

        let intact = PaperStore::new(db.clone())
            .find_by_id(paper.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intact.title, "Keep Me");
        assert_eq!(intact.abstract_text, "Original abstract.");

        let entries = audit
            .query(AuditQuery {
                action: Some(AuditAction::ChangeRejected),
                ..Default::default()
            })
            .await;
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_student_cannot_review() {
        let db = test_db().await;
        let (workflow, audit) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;
        let paper = PaperStore::new(db.clone())
            .create(student.id, "T", "A.", None, None)
            .await
            .unwrap();

        let change = workflow
            .submit_change(
                &student.actor(),
                ChangeType::PaperUpdate,
                paper.id,
                Some(json!({"title": "X"})),
                RequestMeta::default(),
            )
            .await
            .unwrap();

        let err = workflow
            .approve_change(&student.actor(), change.id, RequestMeta::default())
            .await;
        assert!(matches!(err, Err(PortalError::Authorization(_))));

        // No state change, denial audited
        let still_pending = workflow.ledger().get(change.id).await.unwrap().unwrap();
        assert_eq!(still_pending.status, ChangeStatus::Pending);

        let denied = audit
            .query(AuditQuery {
                action: Some(AuditAction::UnauthorizedAttempt),
                ..Default::default()
            })
            .await;
        assert_eq!(denied.len(), 1);
    }

    #[tokio::test]
    async fn test_moderator_cannot_review_academic_year() {
        let db = test_db().await;
        let (workflow, _) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;
        let moderator = users::tests::insert_user(&db, Role::Moderator).await;
        let admin = users::tests::insert_user(&db, Role::Admin).await;

        let change = workflow
            .submit_change(
                &student.actor(),
                ChangeType::AcademicYearChange,
                student.id,
                Some(json!({"academic_year": 3})),
                RequestMeta::default(),
            )
            .await
            .unwrap();

        let err = workflow
            .approve_change(&moderator.actor(), change.id, RequestMeta::default())
            .await;
        assert!(matches!(err, Err(PortalError::Authorization(_))));

        workflow
            .approve_change(&admin.actor(), change.id, RequestMeta::default())
            .await
            .unwrap();

        let updated = UserStore::new(db.clone())
            .find_by_id(student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.academic_year, Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_proposal_conflicts() {
        let db = test_db().await;
        let (workflow, audit) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;

        workflow
            .submit_change(
                &student.actor(),
                ChangeType::AcademicYearChange,
                student.id,
                Some(json!({"academic_year": 2})),
                RequestMeta::default(),
            )
            .await
            .unwrap();

        let second = workflow
            .submit_change(
                &student.actor(),
                ChangeType::AcademicYearChange,
                student.id,
                Some(json!({"academic_year": 4})),
                RequestMeta::default(),
            )
            .await;
        assert!(matches!(second, Err(PortalError::Conflict(_))));

        let open = workflow.ledger().list_pending(None, 10).await.unwrap();
        assert_eq!(open.len(), 1);

        // The collision itself is on the trail
        let failed = audit
            .query(AuditQuery {
                action: Some(AuditAction::ChangeProposalFailed),
                ..Default::default()
            })
            .await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].actor_id, student.id);
        match &failed[0].details {
            Some(AuditDetails::ProposalFailed { change_type, .. }) => {
                assert_eq!(change_type, "academic_year_change");
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_proposal_for_missing_host_is_audited() {
        let db = test_db().await;
        let (workflow, audit) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;

        let err = workflow
            .submit_change(
                &student.actor(),
                ChangeType::PaperUpdate,
                Uuid::new_v4(),
                Some(json!({"title": "Ghost"})),
                RequestMeta::default(),
            )
            .await;
        assert!(matches!(err, Err(PortalError::NotFound(_))));

        let failed = audit
            .query(AuditQuery {
                action: Some(AuditAction::ChangeProposalFailed),
                ..Default::default()
            })
            .await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].resource, AuditResource::Paper);
    }

    #[tokio::test]
    async fn test_approved_deletion_removes_host() {
        let db = test_db().await;
        let (workflow, audit) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;
        let admin = users::tests::insert_user(&db, Role::Admin).await;

        let paper = PaperStore::new(db.clone())
            .create(student.id, "Doomed", "A.", None, None)
            .await
            .unwrap();

        let change = workflow
            .submit_change(
                &student.actor(),
                ChangeType::PaperDeletion,
                paper.id,
                None,
                RequestMeta::default(),
            )
            .await
            .unwrap();

        workflow
            .approve_change(&admin.actor(), change.id, RequestMeta::default())
            .await
            .unwrap();

        assert!(PaperStore::new(db.clone())
            .find_by_id(paper.id)
            .await
            .unwrap()
            .is_none());

        let entries = audit
            .query(AuditQuery {
                action: Some(AuditAction::PaperDelete),
                ..Default::default()
            })
            .await;
        assert_eq!(entries.len(), 1);
        match &entries[0].details {
            Some(AuditDetails::Approval { before, after, .. }) => {
                assert!(before.is_some());
                assert!(after.is_none());
            }
            other => panic!("unexpected details: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_host_mutation_keeps_change_pending() {
        let db = test_db().await;
        let (workflow, _) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;
        let admin = users::tests::insert_user(&db, Role::Admin).await;

        let paper = PaperStore::new(db.clone())
            .create(student.id, "T", "A.", None, None)
            .await
            .unwrap();

        // A payload that passes proposal but fails on apply
        let change = workflow
            .submit_change(
                &student.actor(),
                ChangeType::PaperUpdate,
                paper.id,
                Some(json!({"owner_id": "someone-else"})),
                RequestMeta::default(),
            )
            .await
            .unwrap();

        let err = workflow
            .approve_change(&admin.actor(), change.id, RequestMeta::default())
            .await;
        assert!(err.is_err());

        // Transaction rolled back: still pending, retryable
        let still_pending = workflow.ledger().get(change.id).await.unwrap().unwrap();
        assert_eq!(still_pending.status, ChangeStatus::Pending);
    }

    #[tokio::test]
    async fn test_queue_requires_reviewer_role() {
        let db = test_db().await;
        let (workflow, _) = workflow(&db);

        let student = users::tests::insert_user(&db, Role::Student).await;
        let moderator = users::tests::insert_user(&db, Role::Moderator).await;

        let err = workflow
            .pending_queue(&student.actor(), None, 10)
            .await;
        assert!(matches!(err, Err(PortalError::Authorization(_))));

        assert!(workflow
            .pending_queue(&moderator.actor(), None, 10)
            .await
            .unwrap()
            .is_empty());
    }
}

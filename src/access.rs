/// Role and capability evaluation
///
/// Pure lookup against a static role -> capability table. Safe to call on
/// every request: no I/O, never panics, and an unknown or missing role
/// denies every capability.
use crate::error::{PortalError, PortalResult};
use chrono::{Timelike, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Portal role levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Can propose changes to their own records only
    Student,
    /// Can review paper and idea changes
    Moderator,
    /// Can perform most admin actions
    Admin,
    /// Full access, every capability
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::SuperAdmin),
            _ => Err(PortalError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }
}

/// Named capabilities granted via role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReviewPaperChanges,
    ReviewIdeaChanges,
    ReviewProfileChanges,
    ReviewAcademicYearChanges,
    ReviewDegreeChanges,
    ViewModerationQueue,
    ManageUsers,
    ManageRoles,
    DeleteAnyUser,
    ViewAuditLogs,
}

impl Capability {
    /// Every defined capability
    pub fn all() -> HashSet<Capability> {
        use Capability::*;
        HashSet::from([
            ReviewPaperChanges,
            ReviewIdeaChanges,
            ReviewProfileChanges,
            ReviewAcademicYearChanges,
            ReviewDegreeChanges,
            ViewModerationQueue,
            ManageUsers,
            ManageRoles,
            DeleteAnyUser,
            ViewAuditLogs,
        ])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ReviewPaperChanges => "review_paper_changes",
            Capability::ReviewIdeaChanges => "review_idea_changes",
            Capability::ReviewProfileChanges => "review_profile_changes",
            Capability::ReviewAcademicYearChanges => "review_academic_year_changes",
            Capability::ReviewDegreeChanges => "review_degree_changes",
            Capability::ViewModerationQueue => "view_moderation_queue",
            Capability::ManageUsers => "manage_users",
            Capability::ManageRoles => "manage_roles",
            Capability::DeleteAnyUser => "delete_any_user",
            Capability::ViewAuditLogs => "view_audit_logs",
        }
    }
}

lazy_static! {
    /// Static role -> capability table, built once and never mutated.
    /// SuperAdmin is not present: it short-circuits to every capability.
    static ref ROLE_CAPABILITIES: HashMap<Role, HashSet<Capability>> = {
        use Capability::*;

        let moderator = HashSet::from([
            ReviewPaperChanges,
            ReviewIdeaChanges,
            ViewModerationQueue,
        ]);

        // Admin is a strict superset of moderator
        let mut admin = moderator.clone();
        admin.extend([
            ReviewProfileChanges,
            ReviewAcademicYearChanges,
            ReviewDegreeChanges,
            ManageUsers,
            ManageRoles,
            DeleteAnyUser,
            ViewAuditLogs,
        ]);

        let mut table = HashMap::new();
        table.insert(Role::Student, HashSet::new());
        table.insert(Role::Moderator, moderator);
        table.insert(Role::Admin, admin);
        table
    };
}

/// An authenticated identity performing an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub email: String,
    /// `None` when the stored role string was missing or unrecognized;
    /// evaluates to false for every capability
    pub role: Option<Role>,
    pub faculty: Option<String>,
}

impl Actor {
    pub fn new(id: Uuid, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            role: Some(role),
            faculty: None,
        }
    }

    pub fn with_faculty(mut self, faculty: impl Into<String>) -> Self {
        self.faculty = Some(faculty.into());
        self
    }

    pub fn role_str(&self) -> &'static str {
        self.role.map(|r| r.as_str()).unwrap_or("unknown")
    }
}

/// Extra conditions for resource-scoped checks; all must hold in addition
/// to the base capability
#[derive(Debug, Clone)]
pub enum AccessCondition {
    /// Actor must be the owner of the resource
    OwnedBy(Uuid),
    /// Actor must belong to the given faculty
    FacultyIs(String),
    /// Current UTC hour must fall in [start, end)
    WithinHours { start: u32, end: u32 },
}

impl AccessCondition {
    fn holds(&self, actor: &Actor) -> bool {
        match self {
            AccessCondition::OwnedBy(owner) => actor.id == *owner,
            AccessCondition::FacultyIs(faculty) => {
                actor.faculty.as_deref() == Some(faculty.as_str())
            }
            AccessCondition::WithinHours { start, end } => {
                hour_in_window(Utc::now().hour(), *start, *end)
            }
        }
    }
}

/// Half-open window check; `start > end` wraps past midnight
fn hour_in_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

/// Check whether the actor holds a capability. Fails closed: a missing or
/// unknown role denies everything.
pub fn evaluate(actor: &Actor, capability: Capability) -> bool {
    match actor.role {
        Some(Role::SuperAdmin) => true,
        Some(role) => ROLE_CAPABILITIES
            .get(&role)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false),
        None => false,
    }
}

/// Resource-scoped check: base capability plus every extra condition
pub fn evaluate_scoped(actor: &Actor, capability: Capability, conditions: &[AccessCondition]) -> bool {
    evaluate(actor, capability) && conditions.iter().all(|c| c.holds(actor))
}

/// All capabilities the actor holds
pub fn all_capabilities(actor: &Actor) -> HashSet<Capability> {
    match actor.role {
        Some(Role::SuperAdmin) => Capability::all(),
        Some(role) => ROLE_CAPABILITIES.get(&role).cloned().unwrap_or_default(),
        None => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::new(Uuid::new_v4(), "test@uni.edu", role)
    }

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::SuperAdmin > Role::Admin);
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::Student);

        assert!(Role::SuperAdmin.can_act_as(Role::Admin));
        assert!(Role::Admin.can_act_as(Role::Moderator));
        assert!(!Role::Student.can_act_as(Role::Moderator));
        assert!(!Role::Admin.can_act_as(Role::SuperAdmin));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("student").unwrap(), Role::Student);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("superadmin").unwrap(), Role::SuperAdmin);
        assert!(Role::from_str("professor").is_err());
    }

    #[test]
    fn test_superadmin_has_every_capability() {
        let sa = actor(Role::SuperAdmin);
        for cap in Capability::all() {
            assert!(evaluate(&sa, cap), "superadmin denied {:?}", cap);
        }
        assert_eq!(all_capabilities(&sa), Capability::all());
    }

    #[test]
    fn test_capability_sets_are_nested() {
        let moderator = all_capabilities(&actor(Role::Moderator));
        let admin = all_capabilities(&actor(Role::Admin));
        let superadmin = all_capabilities(&actor(Role::SuperAdmin));

        assert!(moderator.is_subset(&admin));
        assert!(admin.is_subset(&superadmin));
    }

    #[test]
    fn test_student_denied_everything() {
        let student = actor(Role::Student);
        for cap in Capability::all() {
            assert!(!evaluate(&student, cap));
        }
        assert!(all_capabilities(&student).is_empty());
    }

    #[test]
    fn test_moderator_scope() {
        let m = actor(Role::Moderator);
        assert!(evaluate(&m, Capability::ReviewPaperChanges));
        assert!(evaluate(&m, Capability::ViewModerationQueue));
        assert!(!evaluate(&m, Capability::ViewAuditLogs));
        assert!(!evaluate(&m, Capability::ManageRoles));
    }

    #[test]
    fn test_missing_role_fails_closed() {
        let ghost = Actor {
            id: Uuid::new_v4(),
            email: "ghost@uni.edu".to_string(),
            role: None,
            faculty: None,
        };
        for cap in Capability::all() {
            assert!(!evaluate(&ghost, cap));
        }
        assert!(all_capabilities(&ghost).is_empty());
    }

    #[test]
    fn test_ownership_condition() {
        let owner_id = Uuid::new_v4();
        let mut admin = actor(Role::Admin);
        admin.id = owner_id;

        assert!(evaluate_scoped(
            &admin,
            Capability::ManageUsers,
            &[AccessCondition::OwnedBy(owner_id)]
        ));
        assert!(!evaluate_scoped(
            &admin,
            Capability::ManageUsers,
            &[AccessCondition::OwnedBy(Uuid::new_v4())]
        ));
    }

    #[test]
    fn test_faculty_condition() {
        let admin = actor(Role::Admin).with_faculty("engineering");

        assert!(evaluate_scoped(
            &admin,
            Capability::ReviewDegreeChanges,
            &[AccessCondition::FacultyIs("engineering".to_string())]
        ));
        assert!(!evaluate_scoped(
            &admin,
            Capability::ReviewDegreeChanges,
            &[AccessCondition::FacultyIs("law".to_string())]
        ));
    }

    #[test]
    fn test_hour_window() {
        // Same-day window, half-open
        assert!(hour_in_window(9, 9, 17));
        assert!(hour_in_window(16, 9, 17));
        assert!(!hour_in_window(17, 9, 17));
        assert!(!hour_in_window(8, 9, 17));

        // Window wrapping past midnight
        assert!(hour_in_window(23, 22, 6));
        assert!(hour_in_window(0, 22, 6));
        assert!(hour_in_window(5, 22, 6));
        assert!(!hour_in_window(6, 22, 6));
        assert!(!hour_in_window(12, 22, 6));

        // Degenerate empty window
        assert!(!hour_in_window(10, 10, 10));
    }

    #[test]
    fn test_conditions_require_base_capability() {
        let owner_id = Uuid::new_v4();
        let mut student = actor(Role::Student);
        student.id = owner_id;

        // Ownership alone does not grant a capability the role lacks
        assert!(!evaluate_scoped(
            &student,
            Capability::ReviewPaperChanges,
            &[AccessCondition::OwnedBy(owner_id)]
        ));
    }
}

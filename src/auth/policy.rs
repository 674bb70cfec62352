//! Pure authorization decisions over the acting user and the target course.
//!
//! Every function here is a total function over in-memory fields - no I/O,
//! no clock, no randomness. The service layer calls these before dispatching
//! any mutation to the repository and maps Deny to the error taxonomy via
//! [`Decision::permit`].

use crate::course::models::CourseModel;
use crate::shared::AppError;
use crate::user::models::UserModel;

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Why a check denied. WrongRole means the actor's role can never perform
/// the action; NotOwner means the role was right but the course belongs to
/// a different instructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    WrongRole,
    NotOwner,
}

impl Decision {
    /// Converts the decision into a result, describing the denied action.
    /// WrongRole maps to Unauthorized, NotOwner to Forbidden.
    pub fn permit(self, action: &str) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::WrongRole) => Err(AppError::Unauthorized(format!(
                "This role may not {}",
                action
            ))),
            Decision::Deny(DenyReason::NotOwner) => Err(AppError::Forbidden(format!(
                "Only the owning instructor may {}",
                action
            ))),
        }
    }

    pub fn is_allow(self) -> bool {
        self == Decision::Allow
    }
}

/// Only instructors create courses.
pub fn can_create_course(actor: &UserModel) -> Decision {
    if actor.is_instructor() {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::WrongRole)
    }
}

/// Only the instructor who owns the course may modify it. The two denials
/// stay distinguishable: a student is WrongRole, a different instructor is
/// NotOwner.
pub fn can_modify_course(actor: &UserModel, course: &CourseModel) -> Decision {
    if !actor.is_instructor() {
        return Decision::Deny(DenyReason::WrongRole);
    }
    if actor.id != course.instructor_id {
        return Decision::Deny(DenyReason::NotOwner);
    }
    Decision::Allow
}

/// Deletion follows the same rule as modification.
pub fn can_delete_course(actor: &UserModel, course: &CourseModel) -> Decision {
    can_modify_course(actor, course)
}

/// Any instructor may query any instructor's course list - ownership is not
/// required on this read path.
pub fn can_view_instructor_courses(actor: &UserModel) -> Decision {
    if actor.is_instructor() {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::WrongRole)
    }
}

/// Only students enroll; instructors are barred from the student actions.
pub fn can_enroll(actor: &UserModel) -> Decision {
    if actor.is_student() {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::WrongRole)
    }
}

/// Dropping follows the same rule as enrolling.
pub fn can_drop(actor: &UserModel) -> Decision {
    if actor.is_student() {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::WrongRole)
    }
}

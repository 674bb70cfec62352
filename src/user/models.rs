use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Role assigned to a user at registration. Immutable afterwards - there is
/// no promotion flow between the two.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

/// Database model for the users table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserModel {
    pub id: String, // UUID v4 as string
    pub username: String,
    pub email: String,
    pub password_hash: String, // bcrypt hash, opaque to everything but login
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl UserModel {
    /// Creates a new user model with generated ID and creation timestamp.
    /// The password must already be hashed by the caller.
    pub fn new(username: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            email,
            password_hash,
            role,
            created_at: Utc::now(),
        }
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    pub fn is_instructor(&self) -> bool {
        self.role == Role::Instructor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_new_user_model() {
        let user = UserModel::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "$2b$12$fakehash".to_string(),
            Role::Student,
        );

        assert!(!user.id.is_empty());
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert!(user.is_student());
        assert!(!user.is_instructor());
    }

    #[test]
    fn test_role_predicates_are_exclusive() {
        let instructor = UserModel::new(
            "bob".to_string(),
            "bob@example.com".to_string(),
            "$2b$12$fakehash".to_string(),
            Role::Instructor,
        );

        assert!(instructor.is_instructor());
        assert!(!instructor.is_student());
    }

    #[test]
    fn test_role_wire_format_is_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Student).unwrap(), "\"student\"");
        assert_eq!(
            serde_json::to_string(&Role::Instructor).unwrap(),
            "\"instructor\""
        );

        let parsed: Role = serde_json::from_str("\"instructor\"").unwrap();
        assert_eq!(parsed, Role::Instructor);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("student").unwrap(), Role::Student);
        assert_eq!(Role::from_str("instructor").unwrap(), Role::Instructor);
        assert!(Role::from_str("admin").is_err());
    }
}

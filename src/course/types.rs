use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use super::models::CourseModel;
use crate::user::models::UserModel;

/// Request payload for creating a new course
#[derive(Debug, Deserialize)]
pub struct CourseCreateRequest {
    pub title: String,
    pub description: String,
    pub price: i64,
}

/// Patch payload for updating a course. Deliberately narrow: the instructor
/// and the roster have no representation here and can only change through
/// course creation and the enrollment transitions respectively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseUpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
}

/// Sort orders accepted by the listing and search endpoints, in the
/// `?sort=` wire form
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CourseSort {
    DateAsc,
    DateDesc,
    PriceAsc,
    PriceDesc,
    StudentsAsc,
    StudentsDesc,
}

/// Query parameters for listing/search endpoints
#[derive(Debug, Default, Deserialize)]
pub struct CourseListQuery {
    pub sort: Option<CourseSort>,
}

/// Filter for course listings. At most one field is set per operation;
/// an empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub instructor_id: Option<String>,
    pub student_id: Option<String>,
    pub title_contains: Option<String>,
}

impl CourseFilter {
    pub fn by_instructor(instructor_id: &str) -> Self {
        Self {
            instructor_id: Some(instructor_id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_student(student_id: &str) -> Self {
        Self {
            student_id: Some(student_id.to_string()),
            ..Self::default()
        }
    }

    pub fn by_title(fragment: &str) -> Self {
        Self {
            title_contains: Some(fragment.to_string()),
            ..Self::default()
        }
    }
}

/// Instructor identity shown on course payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstructorSummary {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Response for course endpoints: the current course snapshot with the
/// instructor resolved to a displayable summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub instructor: InstructorSummary,
    pub students: Vec<String>,
    pub student_count: i64,
    pub created_at: DateTime<Utc>,
}

impl CourseResponse {
    /// Builds the response from a course and its (possibly already deleted)
    /// instructor. A missing instructor keeps the id and blanks the rest.
    pub fn from_course(course: CourseModel, instructor: Option<&UserModel>) -> Self {
        let instructor = match instructor {
            Some(user) => InstructorSummary {
                id: user.id.clone(),
                username: user.username.clone(),
                email: user.email.clone(),
            },
            None => InstructorSummary {
                id: course.instructor_id.clone(),
                username: String::new(),
                email: String::new(),
            },
        };

        Self {
            id: course.id,
            title: course.title,
            description: course.description,
            price: course.price,
            instructor,
            students: course.students,
            student_count: course.student_count,
            created_at: course.created_at,
        }
    }
}

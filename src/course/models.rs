use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::types::CourseUpdateRequest;

/// Database model for the courses table
///
/// The roster has set semantics: a student id appears at most once, and
/// `student_count` is a cached copy of the roster size that every mutation
/// keeps in lockstep. `version` is the optimistic-concurrency counter the
/// compare-and-set enrollment writes key on.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CourseModel {
    pub id: String, // UUID v4 as string
    pub title: String,
    pub description: String,
    pub price: i64,
    pub instructor_id: String, // Set once at creation, immutable
    pub students: Vec<String>, // Enrolled student ids, no duplicates
    pub student_count: i64,    // Cached roster size, always == students.len()
    pub version: i64,          // Bumped on every write
    pub created_at: DateTime<Utc>,
}

impl CourseModel {
    /// Creates a new course model with generated ID and an empty roster
    pub fn new(instructor_id: String, title: String, description: String, price: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            description,
            price,
            instructor_id,
            students: vec![],
            student_count: 0,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// Check if a student is enrolled in this course
    pub fn has_student(&self, student_id: &str) -> bool {
        self.students.iter().any(|s| s == student_id)
    }

    /// Add a student to the roster and bump the cached count. Callers must
    /// have checked `has_student` first - the roster is a set.
    pub fn enroll_student(&mut self, student_id: String) {
        self.students.push(student_id);
        self.student_count += 1;
        self.version += 1;
    }

    /// Remove a student from the roster and drop the cached count. Callers
    /// must have checked `has_student` first.
    pub fn drop_student(&mut self, student_id: &str) {
        self.students.retain(|s| s != student_id);
        self.student_count -= 1;
        self.version += 1;
    }

    /// Apply a field patch. Only title, description and price are reachable
    /// this way - the instructor and the roster are not part of the patch
    /// surface at all.
    pub fn apply_patch(&mut self, patch: &CourseUpdateRequest) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        self.version += 1;
    }

    /// The invariant every mutation must preserve: the cached count equals
    /// the roster cardinality and the roster holds no duplicates.
    pub fn counts_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let no_duplicates = self.students.iter().all(|s| seen.insert(s));
        no_duplicates && self.student_count == self.students.len() as i64
    }
}

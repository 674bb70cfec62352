use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::models::CourseModel;
use super::types::{CourseFilter, CourseSort, CourseUpdateRequest};
use crate::shared::AppError;

/// Result of attempting to enroll a student
#[derive(Debug, Clone)]
pub enum EnrollResult {
    /// Successfully enrolled, returns the post-transition course
    Success(CourseModel),
    /// The student is already on the roster - rejected, not silently accepted
    AlreadyEnrolled,
    /// Course does not exist
    CourseNotFound,
}

/// Result of attempting to drop a student
#[derive(Debug, Clone)]
pub enum DropResult {
    /// Successfully dropped, returns the post-transition course
    Success(CourseModel),
    /// The student was not on the roster
    NotEnrolled,
    /// Course does not exist
    CourseNotFound,
}

/// Trait for course repository operations
///
/// The enrollment transitions are the only way the roster and the cached
/// count change; `update_course` takes a field patch that cannot reach them.
#[async_trait]
pub trait CourseRepository {
    async fn create_course(&self, course: &CourseModel) -> Result<(), AppError>;
    async fn get_course(&self, course_id: &str) -> Result<Option<CourseModel>, AppError>;

    /// Lists courses matching the filter, ordered by the sort key. No sort
    /// preserves store-native order.
    async fn list_courses(
        &self,
        filter: &CourseFilter,
        sort: Option<CourseSort>,
    ) -> Result<Vec<CourseModel>, AppError>;

    /// Applies a field patch, returning the updated course, or None if the
    /// course does not exist.
    async fn update_course(
        &self,
        course_id: &str,
        patch: &CourseUpdateRequest,
    ) -> Result<Option<CourseModel>, AppError>;

    /// Deletes a course, returning whether it existed.
    async fn delete_course(&self, course_id: &str) -> Result<bool, AppError>;

    /// Atomically enrolls a student: the roster membership check, the roster
    /// append and the count increment happen as one indivisible transition,
    /// so concurrent enrollments can neither lose an increment nor produce a
    /// duplicate roster entry.
    async fn try_enroll(
        &self,
        course_id: &str,
        student_id: &str,
    ) -> Result<EnrollResult, AppError>;

    /// Atomically drops a student, the mirror of `try_enroll`.
    async fn try_drop(&self, course_id: &str, student_id: &str) -> Result<DropResult, AppError>;
}

fn matches_filter(course: &CourseModel, filter: &CourseFilter) -> bool {
    if let Some(instructor_id) = &filter.instructor_id {
        if &course.instructor_id != instructor_id {
            return false;
        }
    }
    if let Some(student_id) = &filter.student_id {
        if !course.has_student(student_id) {
            return false;
        }
    }
    if let Some(fragment) = &filter.title_contains {
        if !course
            .title
            .to_lowercase()
            .contains(&fragment.to_lowercase())
        {
            return false;
        }
    }
    true
}

fn sort_courses(courses: &mut [CourseModel], sort: CourseSort) {
    match sort {
        CourseSort::DateAsc => courses.sort_by_key(|c| c.created_at),
        CourseSort::DateDesc => courses.sort_by_key(|c| std::cmp::Reverse(c.created_at)),
        CourseSort::PriceAsc => courses.sort_by_key(|c| c.price),
        CourseSort::PriceDesc => courses.sort_by_key(|c| std::cmp::Reverse(c.price)),
        CourseSort::StudentsAsc => courses.sort_by_key(|c| c.student_count),
        CourseSort::StudentsDesc => courses.sort_by_key(|c| std::cmp::Reverse(c.student_count)),
    }
}

/// In-memory implementation of CourseRepository for development and testing
///
/// A single mutex over the course map makes every enrollment transition
/// indivisible; readers clone snapshots out and never observe a roster with
/// the count half-applied.
pub struct InMemoryCourseRepository {
    courses: Mutex<HashMap<String, CourseModel>>,
}

impl Default for InMemoryCourseRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCourseRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            courses: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an in-memory repository with pre-populated courses
    pub fn with_courses(courses: Vec<CourseModel>) -> Self {
        let mut course_map = HashMap::new();
        for course in courses {
            course_map.insert(course.id.clone(), course);
        }

        Self {
            courses: Mutex::new(course_map),
        }
    }

    /// Returns the current number of courses in the repository
    pub fn course_count(&self) -> usize {
        self.courses.lock().unwrap().len()
    }
}

#[async_trait]
impl CourseRepository for InMemoryCourseRepository {
    #[instrument(skip(self, course))]
    async fn create_course(&self, course: &CourseModel) -> Result<(), AppError> {
        debug!(course_id = %course.id, instructor_id = %course.instructor_id, "Creating course in memory");

        let mut courses = self.courses.lock().unwrap();
        if courses.contains_key(&course.id) {
            warn!(course_id = %course.id, "Course already exists in memory");
            return Err(AppError::DatabaseError("Course already exists".to_string()));
        }
        courses.insert(course.id.clone(), course.clone());

        debug!(course_id = %course.id, "Course created successfully in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_course(&self, course_id: &str) -> Result<Option<CourseModel>, AppError> {
        debug!(course_id = %course_id, "Fetching course from memory");

        let courses = self.courses.lock().unwrap();
        Ok(courses.get(course_id).cloned())
    }

    #[instrument(skip(self, filter))]
    async fn list_courses(
        &self,
        filter: &CourseFilter,
        sort: Option<CourseSort>,
    ) -> Result<Vec<CourseModel>, AppError> {
        debug!(?sort, "Listing courses from memory");

        let courses = self.courses.lock().unwrap();
        let mut result: Vec<CourseModel> = courses
            .values()
            .filter(|c| matches_filter(c, filter))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            sort_courses(&mut result, sort);
        }

        debug!(course_count = result.len(), "Courses listed from memory");
        Ok(result)
    }

    #[instrument(skip(self, patch))]
    async fn update_course(
        &self,
        course_id: &str,
        patch: &CourseUpdateRequest,
    ) -> Result<Option<CourseModel>, AppError> {
        debug!(course_id = %course_id, "Updating course in memory");

        let mut courses = self.courses.lock().unwrap();
        let Some(course) = courses.get_mut(course_id) else {
            debug!(course_id = %course_id, "Course not found for update");
            return Ok(None);
        };

        course.apply_patch(patch);

        debug!(course_id = %course_id, "Course updated successfully in memory");
        Ok(Some(course.clone()))
    }

    #[instrument(skip(self))]
    async fn delete_course(&self, course_id: &str) -> Result<bool, AppError> {
        debug!(course_id = %course_id, "Deleting course from memory");

        let mut courses = self.courses.lock().unwrap();
        let existed = courses.remove(course_id).is_some();

        debug!(course_id = %course_id, existed, "Course deletion finished");
        Ok(existed)
    }

    #[instrument(skip(self))]
    async fn try_enroll(
        &self,
        course_id: &str,
        student_id: &str,
    ) -> Result<EnrollResult, AppError> {
        debug!(course_id = %course_id, student_id = %student_id, "Attempting to enroll atomically");

        let mut courses = self.courses.lock().unwrap();

        // Get the course or return CourseNotFound
        let course = match courses.get_mut(course_id) {
            Some(course) => course,
            None => {
                debug!(course_id = %course_id, "Course not found");
                return Ok(EnrollResult::CourseNotFound);
            }
        };

        // Re-enrollment is a rejection, not a silent success
        if course.has_student(student_id) {
            debug!(course_id = %course_id, student_id = %student_id, "Student already enrolled");
            return Ok(EnrollResult::AlreadyEnrolled);
        }

        // Roster append and count increment under the same lock
        course.enroll_student(student_id.to_string());

        let updated_course = course.clone();

        info!(
            course_id = %course_id,
            student_id = %student_id,
            new_student_count = updated_course.student_count,
            "Student enrolled successfully (atomic)"
        );

        Ok(EnrollResult::Success(updated_course))
    }

    #[instrument(skip(self))]
    async fn try_drop(&self, course_id: &str, student_id: &str) -> Result<DropResult, AppError> {
        debug!(course_id = %course_id, student_id = %student_id, "Attempting to drop atomically");

        let mut courses = self.courses.lock().unwrap();

        // Get the course or return CourseNotFound
        let course = match courses.get_mut(course_id) {
            Some(course) => course,
            None => {
                debug!(course_id = %course_id, "Course not found");
                return Ok(DropResult::CourseNotFound);
            }
        };

        // Dropping without being enrolled is a rejection
        if !course.has_student(student_id) {
            debug!(course_id = %course_id, student_id = %student_id, "Student not enrolled");
            return Ok(DropResult::NotEnrolled);
        }

        // Roster removal and count decrement under the same lock
        course.drop_student(student_id);

        let updated_course = course.clone();

        info!(
            course_id = %course_id,
            student_id = %student_id,
            new_student_count = updated_course.student_count,
            "Student dropped successfully (atomic)"
        );

        Ok(DropResult::Success(updated_course))
    }
}

/// How many times a compare-and-set write retries after losing to a
/// concurrent writer before the transition is surfaced as a failure.
const CAS_MAX_RETRIES: u32 = 3;

/// PostgreSQL implementation of course repository
///
/// Enrollment transitions use optimistic concurrency: read the row, check
/// the roster, then write roster + count + bumped version conditioned on the
/// version still matching. A lost race affects zero rows and is retried.
pub struct PostgresCourseRepository {
    pool: PgPool,
}

impl PostgresCourseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_course(&self, course_id: &str) -> Result<Option<CourseModel>, AppError> {
        let row = sqlx::query(
            "SELECT id, title, description, price, instructor_id, students, student_count, version, created_at FROM courses WHERE id = $1"
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, course_id = %course_id, "Failed to fetch course from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.as_ref().map(row_to_course))
    }

    /// Writes the transitioned roster/count/version conditioned on the
    /// version observed at read time. Returns whether the write won.
    async fn cas_write(&self, course: &CourseModel, observed_version: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE courses SET students = $2, student_count = $3, version = $4 WHERE id = $1 AND version = $5"
        )
        .bind(&course.id)
        .bind(&course.students)
        .bind(course.student_count)
        .bind(course.version)
        .bind(observed_version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, course_id = %course.id, "Failed to write enrollment transition");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected() == 1)
    }
}

fn row_to_course(row: &sqlx::postgres::PgRow) -> CourseModel {
    CourseModel {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        price: row.get("price"),
        instructor_id: row.get("instructor_id"),
        students: row.get("students"),
        student_count: row.get("student_count"),
        version: row.get("version"),
        created_at: row.get("created_at"),
    }
}

fn order_clause(sort: Option<CourseSort>) -> &'static str {
    match sort {
        None => "",
        Some(CourseSort::DateAsc) => " ORDER BY created_at ASC",
        Some(CourseSort::DateDesc) => " ORDER BY created_at DESC",
        Some(CourseSort::PriceAsc) => " ORDER BY price ASC",
        Some(CourseSort::PriceDesc) => " ORDER BY price DESC",
        Some(CourseSort::StudentsAsc) => " ORDER BY student_count ASC",
        Some(CourseSort::StudentsDesc) => " ORDER BY student_count DESC",
    }
}

/// Escapes LIKE metacharacters in a user-supplied search fragment
fn escape_like(fragment: &str) -> String {
    fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl CourseRepository for PostgresCourseRepository {
    #[instrument(skip(self, course))]
    async fn create_course(&self, course: &CourseModel) -> Result<(), AppError> {
        debug!(course_id = %course.id, instructor_id = %course.instructor_id, "Creating course in database");

        sqlx::query(
            "INSERT INTO courses (id, title, description, price, instructor_id, students, student_count, version, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        )
        .bind(&course.id)
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.price)
        .bind(&course.instructor_id)
        .bind(&course.students)
        .bind(course.student_count)
        .bind(course.version)
        .bind(course.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create course in database");
            AppError::DatabaseError(e.to_string())
        })?;

        debug!(course_id = %course.id, "Course created successfully in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_course(&self, course_id: &str) -> Result<Option<CourseModel>, AppError> {
        debug!(course_id = %course_id, "Fetching course from database");
        self.fetch_course(course_id).await
    }

    #[instrument(skip(self, filter))]
    async fn list_courses(
        &self,
        filter: &CourseFilter,
        sort: Option<CourseSort>,
    ) -> Result<Vec<CourseModel>, AppError> {
        debug!(?sort, "Listing courses from database");

        let base = "SELECT id, title, description, price, instructor_id, students, student_count, version, created_at FROM courses";
        let order = order_clause(sort);

        // At most one filter dimension is active per operation
        let (sql, bind_value) = if let Some(instructor_id) = &filter.instructor_id {
            (
                format!("{} WHERE instructor_id = $1{}", base, order),
                Some(instructor_id.clone()),
            )
        } else if let Some(student_id) = &filter.student_id {
            (
                format!("{} WHERE $1 = ANY(students){}", base, order),
                Some(student_id.clone()),
            )
        } else if let Some(fragment) = &filter.title_contains {
            (
                format!("{} WHERE title ILIKE $1{}", base, order),
                Some(format!("%{}%", escape_like(fragment))),
            )
        } else {
            (format!("{}{}", base, order), None)
        };

        let mut query = sqlx::query(&sql);
        if let Some(value) = bind_value {
            query = query.bind(value);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            warn!(error = %e, "Failed to list courses from database");
            AppError::DatabaseError(e.to_string())
        })?;

        debug!(course_count = rows.len(), "Courses listed from database");
        Ok(rows.iter().map(row_to_course).collect())
    }

    #[instrument(skip(self, patch))]
    async fn update_course(
        &self,
        course_id: &str,
        patch: &CourseUpdateRequest,
    ) -> Result<Option<CourseModel>, AppError> {
        debug!(course_id = %course_id, "Updating course in database");

        // The patch never touches instructor_id, students or student_count
        let row = sqlx::query(
            "UPDATE courses SET title = COALESCE($2, title), description = COALESCE($3, description), price = COALESCE($4, price), version = version + 1 WHERE id = $1 RETURNING id, title, description, price, instructor_id, students, student_count, version, created_at"
        )
        .bind(course_id)
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.price)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, course_id = %course_id, "Failed to update course in database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.as_ref().map(row_to_course))
    }

    #[instrument(skip(self))]
    async fn delete_course(&self, course_id: &str) -> Result<bool, AppError> {
        debug!(course_id = %course_id, "Deleting course from database");

        let result = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(course_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, course_id = %course_id, "Failed to delete course from database");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn try_enroll(
        &self,
        course_id: &str,
        student_id: &str,
    ) -> Result<EnrollResult, AppError> {
        debug!(course_id = %course_id, student_id = %student_id, "Attempting to enroll atomically");

        for attempt in 0..CAS_MAX_RETRIES {
            let Some(course) = self.fetch_course(course_id).await? else {
                debug!(course_id = %course_id, "Course not found");
                return Ok(EnrollResult::CourseNotFound);
            };

            if course.has_student(student_id) {
                debug!(course_id = %course_id, student_id = %student_id, "Student already enrolled");
                return Ok(EnrollResult::AlreadyEnrolled);
            }

            let observed_version = course.version;
            let mut updated = course;
            updated.enroll_student(student_id.to_string());

            if self.cas_write(&updated, observed_version).await? {
                info!(
                    course_id = %course_id,
                    student_id = %student_id,
                    new_student_count = updated.student_count,
                    "Student enrolled successfully (atomic)"
                );
                return Ok(EnrollResult::Success(updated));
            }

            warn!(
                course_id = %course_id,
                student_id = %student_id,
                attempt,
                "Enrollment write lost to a concurrent transition, retrying"
            );
        }

        Err(AppError::InvalidState(format!(
            "enrollment on course {} kept conflicting after {} attempts",
            course_id, CAS_MAX_RETRIES
        )))
    }

    #[instrument(skip(self))]
    async fn try_drop(&self, course_id: &str, student_id: &str) -> Result<DropResult, AppError> {
        debug!(course_id = %course_id, student_id = %student_id, "Attempting to drop atomically");

        for attempt in 0..CAS_MAX_RETRIES {
            let Some(course) = self.fetch_course(course_id).await? else {
                debug!(course_id = %course_id, "Course not found");
                return Ok(DropResult::CourseNotFound);
            };

            if !course.has_student(student_id) {
                debug!(course_id = %course_id, student_id = %student_id, "Student not enrolled");
                return Ok(DropResult::NotEnrolled);
            }

            let observed_version = course.version;
            let mut updated = course;
            updated.drop_student(student_id);

            if self.cas_write(&updated, observed_version).await? {
                info!(
                    course_id = %course_id,
                    student_id = %student_id,
                    new_student_count = updated.student_count,
                    "Student dropped successfully (atomic)"
                );
                return Ok(DropResult::Success(updated));
            }

            warn!(
                course_id = %course_id,
                student_id = %student_id,
                attempt,
                "Drop write lost to a concurrent transition, retrying"
            );
        }

        Err(AppError::InvalidState(format!(
            "drop on course {} kept conflicting after {} attempts",
            course_id, CAS_MAX_RETRIES
        )))
    }
}

use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use super::{
    models::CourseModel,
    repository::{CourseRepository, DropResult, EnrollResult},
    types::{CourseCreateRequest, CourseFilter, CourseResponse, CourseSort, CourseUpdateRequest},
};
use crate::auth::policy;
use crate::shared::AppError;
use crate::user::models::UserModel;
use crate::user::repository::UserRepository;

/// Service for course business logic: the authorization gate in front of the
/// registry and the enrollment state machine. Every operation takes the
/// already-resolved acting user; the repository below trusts this layer to
/// have authorized the call.
pub struct CourseService {
    repository: Arc<dyn CourseRepository + Send + Sync>,
    users: Arc<dyn UserRepository + Send + Sync>,
}

impl CourseService {
    pub fn new(
        repository: Arc<dyn CourseRepository + Send + Sync>,
        users: Arc<dyn UserRepository + Send + Sync>,
    ) -> Self {
        Self { repository, users }
    }

    /// Creates a new course owned by the acting instructor
    #[instrument(skip(self, actor, request))]
    pub async fn create_course(
        &self,
        actor: &UserModel,
        request: CourseCreateRequest,
    ) -> Result<CourseResponse, AppError> {
        policy::can_create_course(actor).permit("create a course")?;

        let course = CourseModel::new(
            actor.id.clone(),
            request.title,
            request.description,
            request.price,
        );
        debug!(course_id = %course.id, "Generated course ID");

        self.repository.create_course(&course).await?;

        info!(
            course_id = %course.id,
            instructor_id = %actor.id,
            "Course created successfully"
        );

        Ok(CourseResponse::from_course(course, Some(actor)))
    }

    /// Gets a course snapshot by id
    #[instrument(skip(self))]
    pub async fn get_course(&self, course_id: &str) -> Result<CourseResponse, AppError> {
        let course = self
            .repository
            .get_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        self.to_response(course).await
    }

    /// Lists all courses, optionally sorted
    #[instrument(skip(self))]
    pub async fn list_courses(
        &self,
        sort: Option<CourseSort>,
    ) -> Result<Vec<CourseResponse>, AppError> {
        let courses = self
            .repository
            .list_courses(&CourseFilter::default(), sort)
            .await?;

        info!(course_count = courses.len(), "Courses retrieved successfully");

        self.to_responses(courses).await
    }

    /// Applies a field patch to a course owned by the acting instructor
    #[instrument(skip(self, actor, patch))]
    pub async fn update_course(
        &self,
        actor: &UserModel,
        course_id: &str,
        patch: CourseUpdateRequest,
    ) -> Result<CourseResponse, AppError> {
        let course = self
            .repository
            .get_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        policy::can_modify_course(actor, &course).permit("update this course")?;

        let updated = self
            .repository
            .update_course(course_id, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        info!(course_id = %course_id, "Course updated successfully");

        self.to_response(updated).await
    }

    /// Deletes a course owned by the acting instructor
    #[instrument(skip(self, actor))]
    pub async fn delete_course(&self, actor: &UserModel, course_id: &str) -> Result<(), AppError> {
        let course = self
            .repository
            .get_course(course_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        policy::can_delete_course(actor, &course).permit("delete this course")?;

        if !self.repository.delete_course(course_id).await? {
            return Err(AppError::NotFound("Course not found".to_string()));
        }

        info!(course_id = %course_id, "Course deleted successfully");
        Ok(())
    }

    /// Enrolls the acting student, transitioning the (course, student) pair
    /// from not-enrolled to enrolled
    #[instrument(skip(self, actor))]
    pub async fn enroll(
        &self,
        actor: &UserModel,
        course_id: &str,
    ) -> Result<CourseResponse, AppError> {
        policy::can_enroll(actor).permit("enroll in a course")?;

        info!(course_id = %course_id, student_id = %actor.id, "Attempting to enroll");

        let result = self.repository.try_enroll(course_id, &actor.id).await?;

        match result {
            EnrollResult::Success(updated) => {
                self.check_consistency(&updated)?;
                info!(
                    course_id = %course_id,
                    student_id = %actor.id,
                    new_student_count = updated.student_count,
                    "Student enrolled successfully"
                );
                self.to_response(updated).await
            }
            EnrollResult::AlreadyEnrolled => {
                debug!(course_id = %course_id, student_id = %actor.id, "Already enrolled");
                Err(AppError::Conflict(
                    "Already enrolled in this course".to_string(),
                ))
            }
            EnrollResult::CourseNotFound => {
                Err(AppError::NotFound("Course not found".to_string()))
            }
        }
    }

    /// Drops the acting student, the reverse transition of `enroll`
    #[instrument(skip(self, actor))]
    pub async fn drop(
        &self,
        actor: &UserModel,
        course_id: &str,
    ) -> Result<CourseResponse, AppError> {
        policy::can_drop(actor).permit("drop a course")?;

        info!(course_id = %course_id, student_id = %actor.id, "Attempting to drop");

        let result = self.repository.try_drop(course_id, &actor.id).await?;

        match result {
            DropResult::Success(updated) => {
                self.check_consistency(&updated)?;
                info!(
                    course_id = %course_id,
                    student_id = %actor.id,
                    new_student_count = updated.student_count,
                    "Student dropped successfully"
                );
                self.to_response(updated).await
            }
            DropResult::NotEnrolled => {
                debug!(course_id = %course_id, student_id = %actor.id, "Not enrolled");
                Err(AppError::Conflict("Not enrolled in this course".to_string()))
            }
            DropResult::CourseNotFound => Err(AppError::NotFound("Course not found".to_string())),
        }
    }

    /// Lists courses taught by the given instructor. Any instructor may
    /// query any instructor's list; students may not.
    #[instrument(skip(self, actor))]
    pub async fn list_by_instructor(
        &self,
        actor: &UserModel,
        instructor_id: &str,
    ) -> Result<Vec<CourseResponse>, AppError> {
        policy::can_view_instructor_courses(actor).permit("list an instructor's courses")?;

        let courses = self
            .repository
            .list_courses(&CourseFilter::by_instructor(instructor_id), None)
            .await?;

        self.to_responses(courses).await
    }

    /// Lists courses the given student is enrolled in
    #[instrument(skip(self))]
    pub async fn list_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<CourseResponse>, AppError> {
        let courses = self
            .repository
            .list_courses(&CourseFilter::by_student(student_id), None)
            .await?;

        self.to_responses(courses).await
    }

    /// Case-insensitive substring search on course titles
    #[instrument(skip(self))]
    pub async fn search_by_title(
        &self,
        fragment: &str,
        sort: Option<CourseSort>,
    ) -> Result<Vec<CourseResponse>, AppError> {
        let courses = self
            .repository
            .list_courses(&CourseFilter::by_title(fragment), sort)
            .await?;

        info!(
            course_count = courses.len(),
            fragment = %fragment,
            "Title search finished"
        );

        self.to_responses(courses).await
    }

    /// Post-transition guard for the roster/count invariant. Tripping it
    /// means a defect in the storage layer, not a user error.
    fn check_consistency(&self, course: &CourseModel) -> Result<(), AppError> {
        if course.counts_consistent() {
            Ok(())
        } else {
            error!(
                course_id = %course.id,
                student_count = course.student_count,
                roster_len = course.students.len(),
                "Roster and cached count diverged"
            );
            Err(AppError::InvalidState(format!(
                "course {} roster and student count diverged",
                course.id
            )))
        }
    }

    async fn to_response(&self, course: CourseModel) -> Result<CourseResponse, AppError> {
        let instructor = self.users.find_by_id(&course.instructor_id).await?;
        Ok(CourseResponse::from_course(course, instructor.as_ref()))
    }

    async fn to_responses(
        &self,
        courses: Vec<CourseModel>,
    ) -> Result<Vec<CourseResponse>, AppError> {
        let mut responses = Vec::with_capacity(courses.len());
        for course in courses {
            responses.push(self.to_response(course).await?);
        }
        Ok(responses)
    }
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    service::CourseService,
    types::{CourseCreateRequest, CourseListQuery, CourseResponse, CourseUpdateRequest},
};
use crate::auth::types::CurrentUser;
use crate::shared::{AppError, AppState};

fn service(state: &AppState) -> CourseService {
    CourseService::new(
        Arc::clone(&state.course_repository),
        Arc::clone(&state.user_repository),
    )
}

/// HTTP handler for creating a new course
///
/// POST /api/courses
/// Returns the created course with an empty roster
#[instrument(name = "create_course", skip(state, actor, request))]
pub async fn create_course(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Json(request): Json<CourseCreateRequest>,
) -> Result<(StatusCode, Json<CourseResponse>), AppError> {
    info!(actor_id = %actor.id, title = %request.title, "Creating new course");

    let course = service(&state).create_course(&actor, request).await?;

    info!(course_id = %course.id, "Course created successfully");

    Ok((StatusCode::CREATED, Json(course)))
}

/// HTTP handler for listing all courses
///
/// GET /api/courses?sort=price-asc
#[instrument(name = "list_courses", skip(state))]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<CourseListQuery>,
) -> Result<Json<Vec<CourseResponse>>, AppError> {
    info!(?query.sort, "Listing all courses");

    let courses = service(&state).list_courses(query.sort).await?;

    info!(course_count = courses.len(), "Courses listed successfully");

    Ok(Json(courses))
}

/// HTTP handler for fetching a single course
///
/// GET /api/courses/:id
#[instrument(name = "get_course", skip(state))]
pub async fn get_course(
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseResponse>, AppError> {
    let course = service(&state).get_course(&course_id).await?;

    Ok(Json(course))
}

/// HTTP handler for patching a course
///
/// PATCH /api/courses/:id
#[instrument(name = "update_course", skip(state, actor, patch))]
pub async fn update_course(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(course_id): Path<String>,
    Json(patch): Json<CourseUpdateRequest>,
) -> Result<Json<CourseResponse>, AppError> {
    info!(actor_id = %actor.id, course_id = %course_id, "Updating course");

    let course = service(&state)
        .update_course(&actor, &course_id, patch)
        .await?;

    Ok(Json(course))
}

/// HTTP handler for deleting a course
///
/// DELETE /api/courses/:id
#[instrument(name = "delete_course", skip(state, actor))]
pub async fn delete_course(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(course_id): Path<String>,
) -> Result<StatusCode, AppError> {
    info!(actor_id = %actor.id, course_id = %course_id, "Deleting course");

    service(&state).delete_course(&actor, &course_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// HTTP handler for listing an instructor's courses
///
/// GET /api/courses/instructor/:id
#[instrument(name = "list_by_instructor", skip(state, actor))]
pub async fn list_by_instructor(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(instructor_id): Path<String>,
) -> Result<Json<Vec<CourseResponse>>, AppError> {
    let courses = service(&state)
        .list_by_instructor(&actor, &instructor_id)
        .await?;

    Ok(Json(courses))
}

/// HTTP handler for listing a student's enrollments
///
/// GET /api/courses/student/:id
#[instrument(name = "list_by_student", skip(state))]
pub async fn list_by_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<CourseResponse>>, AppError> {
    let courses = service(&state).list_by_student(&student_id).await?;

    Ok(Json(courses))
}

/// HTTP handler for title search
///
/// GET /api/courses/search/:title?sort=students-desc
#[instrument(name = "search_by_title", skip(state))]
pub async fn search_by_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Query(query): Query<CourseListQuery>,
) -> Result<Json<Vec<CourseResponse>>, AppError> {
    let courses = service(&state).search_by_title(&title, query.sort).await?;

    Ok(Json(courses))
}

/// HTTP handler for enrolling the acting student
///
/// POST /api/courses/:id/enroll
/// Returns the post-enrollment course snapshot
#[instrument(name = "enroll", skip(state, actor))]
pub async fn enroll(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseResponse>, AppError> {
    info!(actor_id = %actor.id, course_id = %course_id, "Enrolling in course");

    let course = service(&state).enroll(&actor, &course_id).await?;

    Ok(Json(course))
}

/// HTTP handler for dropping the acting student
///
/// DELETE /api/courses/:id/enroll
/// Returns the post-drop course snapshot
#[instrument(name = "drop_course", skip(state, actor))]
pub async fn drop_course(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseResponse>, AppError> {
    info!(actor_id = %actor.id, course_id = %course_id, "Dropping course");

    let course = service(&state).drop(&actor, &course_id).await?;

    Ok(Json(course))
}

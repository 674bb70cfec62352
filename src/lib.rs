// Library crate for the course marketplace server
// This file exposes the public API for integration tests

pub mod auth;
pub mod course;
pub mod shared;
pub mod user;

// Re-export commonly used types for easier access in tests
pub use auth::{jwt_auth, AuthClaims, CurrentUser};
pub use course::models::CourseModel;
pub use course::repository::CourseRepository;
pub use shared::{AppError, AppState};
pub use user::models::{Role, UserModel};
pub use user::repository::UserRepository;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Builds the full application router over the given state. Everything past
/// the register/login endpoints requires a valid bearer token; the auth
/// middleware resolves the acting user before any handler runs.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/users/:id/profile", patch(user::update_profile))
        .route("/api/users/:id/password", patch(user::change_password))
        .route(
            "/api/courses",
            post(course::create_course).get(course::list_courses),
        )
        .route(
            "/api/courses/:id",
            get(course::get_course)
                .patch(course::update_course)
                .delete(course::delete_course),
        )
        .route("/api/courses/instructor/:id", get(course::list_by_instructor))
        .route("/api/courses/student/:id", get(course::list_by_student))
        .route("/api/courses/search/:title", get(course::search_by_title))
        .route(
            "/api/courses/:id/enroll",
            post(course::enroll).delete(course::drop_course),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth));

    Router::new()
        .route("/api/users/register", post(user::register))
        .route("/api/users/login", post(user::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

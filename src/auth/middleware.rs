use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use super::types::CurrentUser;
use crate::shared::{AppError, AppState};

/// JWT authentication middleware - validates the Authorization Bearer header,
/// resolves the acting user from the user repository and adds it to request
/// extensions as CurrentUser.
/// Usage: .layer(middleware::from_fn_with_state(app_state.clone(), auth::jwt_auth))
/// Handlers can then extract Extension(CurrentUser(actor)).
#[instrument(skip(state, req, next))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    debug!(uri = %req.uri(), "JWT authentication middleware triggered");

    // Extract token from Authorization Bearer header
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Authorization header in request");
            AppError::Unauthorized("Missing authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("Invalid Authorization header format (expected Bearer token)");
        AppError::Unauthorized("Invalid authorization header format".to_string())
    })?;

    // Validate token signature and expiry
    let claims = state.token_config.validate_token(token)?;

    // Resolve the acting identity; a valid token for a deleted user is useless
    let user = state
        .user_repository
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "Token references a user that no longer exists");
            AppError::Unauthorized("Unknown user".to_string())
        })?;

    debug!(
        user_id = %user.id,
        role = %user.role,
        "Authentication successful, adding acting user to request"
    );

    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use crate::user::models::{Role, UserModel};
    use crate::user::repository::{InMemoryUserRepository, UserRepository};
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    async fn echo_user(Extension(CurrentUser(user)): Extension<CurrentUser>) -> String {
        user.username
    }

    fn protected_router(state: AppState) -> Router {
        Router::new()
            .route("/whoami", get(echo_user))
            .layer(from_fn_with_state(state.clone(), jwt_auth))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_request_without_token_is_rejected() {
        let app_state = AppStateBuilder::new().build();
        let app = protected_router(app_state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_request_with_malformed_header_is_rejected() {
        let app_state = AppStateBuilder::new().build();
        let app = protected_router(app_state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header("Authorization", "Token abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_resolves_acting_user() {
        let repo = Arc::new(InMemoryUserRepository::new());
        let user = UserModel::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "$2b$12$fakehash".to_string(),
            Role::Student,
        );
        repo.create_user(&user).await.unwrap();

        let app_state = AppStateBuilder::new().with_user_repository(repo).build();
        let token = app_state
            .token_config
            .create_token(user.id.clone(), user.email.clone())
            .unwrap();
        let app = protected_router(app_state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"alice");
    }

    #[tokio::test]
    async fn test_token_for_deleted_user_is_rejected() {
        // Dummy user repository returns None for every lookup
        let app_state = AppStateBuilder::new().build();
        let token = app_state
            .token_config
            .create_token("ghost-id".to_string(), "ghost@example.com".to_string())
            .unwrap();
        let app = protected_router(app_state);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

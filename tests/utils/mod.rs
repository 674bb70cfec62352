use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

use coursehub::auth::token::TokenConfig;
use coursehub::course::repository::InMemoryCourseRepository;
use coursehub::shared::AppState;
use coursehub::user::repository::InMemoryUserRepository;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

/// A full application over in-memory repositories. The router is cheap to
/// clone and every clone shares the same state, so concurrent requests in a
/// test hit the same stores.
pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let state = AppState::new(
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryCourseRepository::new()),
            TokenConfig::new(),
        );

        Self {
            router: coursehub::build_router(state),
        }
    }

    /// Sends a request, optionally authenticated and with a JSON body
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Registers a user and logs in, returning the bearer token and the
    /// user's id
    pub async fn register_and_login(&self, username: &str, role: &str) -> (String, String) {
        let email = format!("{}@example.com", username);

        let register = self
            .request(
                "POST",
                "/api/users/register",
                None,
                Some(json!({
                    "username": username,
                    "email": email,
                    "password": "correct horse battery staple",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(register.status(), StatusCode::CREATED);

        let login = self
            .request(
                "POST",
                "/api/users/login",
                None,
                Some(json!({
                    "email": email,
                    "password": "correct horse battery staple",
                })),
            )
            .await;
        assert_eq!(login.status(), StatusCode::OK);

        let body = response_json(login).await;
        let token = body["token"].as_str().unwrap().to_string();
        let user_id = body["user"]["id"].as_str().unwrap().to_string();
        (token, user_id)
    }

    /// Creates a course as the given instructor and returns its id
    pub async fn create_course(&self, token: &str, title: &str, price: i64) -> String {
        let response = self
            .request(
                "POST",
                "/api/courses",
                Some(token),
                Some(json!({
                    "title": title,
                    "description": format!("{} description", title),
                    "price": price,
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response_json(response).await;
        body["id"].as_str().unwrap().to_string()
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a response body as JSON
pub async fn response_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::UserModel;
use crate::shared::AppError;

/// Trait for user repository operations
#[async_trait]
pub trait UserRepository {
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError>;
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserModel>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError>;

    /// Updates username and email, returning the updated user, or None if the
    /// user does not exist. Role and password hash are untouched.
    async fn update_profile(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
    ) -> Result<Option<UserModel>, AppError>;

    /// Replaces the stored password hash, returning the updated user, or None
    /// if the user does not exist.
    async fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<Option<UserModel>, AppError>;
}

/// In-memory implementation of UserRepository for development and testing
///
/// Data is stored in memory and lost on restart. The email-uniqueness
/// constraint a database would enforce via a unique index is enforced here
/// at insert time.
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, UserModel>>,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an in-memory repository with pre-populated users
    pub fn with_users(users: Vec<UserModel>) -> Self {
        let mut user_map = HashMap::new();
        for user in users {
            user_map.insert(user.id.clone(), user);
        }

        Self {
            users: Mutex::new(user_map),
        }
    }

    /// Returns the current number of users in the repository
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError> {
        debug!(user_id = %user.id, email = %user.email, "Creating user in memory");

        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.id) {
            warn!(user_id = %user.id, "User id already exists in memory");
            return Err(AppError::DatabaseError("User already exists".to_string()));
        }
        if users.values().any(|u| u.email == user.email) {
            warn!(email = %user.email, "Email already registered in memory");
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }
        users.insert(user.id.clone(), user.clone());

        debug!(user_id = %user.id, "User created successfully in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        debug!(user_id = %user_id, "Fetching user by id from memory");

        let users = self.users.lock().unwrap();
        Ok(users.get(user_id).cloned())
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        debug!(email = %email, "Fetching user by email from memory");

        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    #[instrument(skip(self))]
    async fn update_profile(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
    ) -> Result<Option<UserModel>, AppError> {
        debug!(user_id = %user_id, "Updating user profile in memory");

        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(user_id) else {
            debug!(user_id = %user_id, "User not found for profile update");
            return Ok(None);
        };

        user.username = username.to_string();
        user.email = email.to_string();

        debug!(user_id = %user_id, "User profile updated successfully in memory");
        Ok(Some(user.clone()))
    }

    #[instrument(skip(self, password_hash))]
    async fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<Option<UserModel>, AppError> {
        debug!(user_id = %user_id, "Updating user password in memory");

        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(user_id) else {
            debug!(user_id = %user_id, "User not found for password update");
            return Ok(None);
        };

        user.password_hash = password_hash.to_string();

        debug!(user_id = %user_id, "User password updated successfully in memory");
        Ok(Some(user.clone()))
    }
}

/// PostgreSQL implementation of user repository
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a unique-index violation on the email column to Conflict so the
/// registration race (two requests with the same email) surfaces as the same
/// error kind as the pre-insert check.
fn map_insert_error(e: sqlx::Error) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            return AppError::Conflict("Email is already registered".to_string());
        }
    }
    AppError::DatabaseError(e.to_string())
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> UserModel {
    UserModel {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: row.get("role"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError> {
        debug!(user_id = %user.id, email = %user.email, "Creating user in database");

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, role, created_at) VALUES ($1, $2, $3, $4, $5, $6)"
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create user in database");
            map_insert_error(e)
        })?;

        debug!(user_id = %user.id, "User created successfully in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        debug!(user_id = %user_id, "Fetching user by id from database");

        let row = sqlx::query(
            "SELECT id, username, email, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to fetch user from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.as_ref().map(row_to_user))
    }

    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, AppError> {
        debug!(email = %email, "Fetching user by email from database");

        let row = sqlx::query(
            "SELECT id, username, email, password_hash, role, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch user by email from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.as_ref().map(row_to_user))
    }

    #[instrument(skip(self))]
    async fn update_profile(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
    ) -> Result<Option<UserModel>, AppError> {
        debug!(user_id = %user_id, "Updating user profile in database");

        let row = sqlx::query(
            "UPDATE users SET username = $2, email = $3 WHERE id = $1 RETURNING id, username, email, password_hash, role, created_at"
        )
        .bind(user_id)
        .bind(username)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to update user profile in database");
            map_insert_error(e)
        })?;

        Ok(row.as_ref().map(row_to_user))
    }

    #[instrument(skip(self, password_hash))]
    async fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<Option<UserModel>, AppError> {
        debug!(user_id = %user_id, "Updating user password in database");

        let row = sqlx::query(
            "UPDATE users SET password_hash = $2 WHERE id = $1 RETURNING id, username, email, password_hash, role, created_at"
        )
        .bind(user_id)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to update user password in database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.as_ref().map(row_to_user))
    }
}

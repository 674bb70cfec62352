use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    models::UserModel,
    repository::UserRepository,
    types::{
        ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest,
        UpdateProfileRequest, UserResponse,
    },
};
use crate::auth::token::TokenConfig;
use crate::shared::AppError;

/// Service for handling user business logic: registration, login and
/// self-service profile updates. Passwords are bcrypt-hashed here and never
/// stored or returned in plaintext.
pub struct UserService {
    repository: Arc<dyn UserRepository + Send + Sync>,
    token_config: TokenConfig,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository + Send + Sync>, token_config: TokenConfig) -> Self {
        Self {
            repository,
            token_config,
        }
    }

    /// Registers a new user. Fails with Conflict if the email is taken.
    #[instrument(skip(self, request))]
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, AppError> {
        info!(email = %request.email, role = %request.role, "Registering new user");

        if let Some(existing) = self.repository.find_by_email(&request.email).await? {
            warn!(email = %request.email, existing_id = %existing.id, "Email already registered");
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let password_hash = hash_password(&request.password)?;
        let user = UserModel::new(request.username, request.email, password_hash, request.role);

        self.repository.create_user(&user).await?;

        info!(user_id = %user.id, role = %user.role, "User registered successfully");
        Ok(UserResponse::from(user))
    }

    /// Verifies credentials and issues a JWT for the session.
    #[instrument(skip(self, request))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        info!(email = %request.email, "Attempting login");

        let user = self
            .repository
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| {
                warn!(email = %request.email, "Login with unknown email");
                AppError::Unauthorized("No user registered with that email".to_string())
            })?;

        let matches = bcrypt::verify(&request.password, &user.password_hash).map_err(|e| {
            warn!(error = %e, "Password verification failed");
            AppError::Internal
        })?;
        if !matches {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(AppError::Unauthorized("Wrong password".to_string()));
        }

        let token = self
            .token_config
            .create_token(user.id.clone(), user.email.clone())?;

        info!(user_id = %user.id, "Login successful");
        Ok(LoginResponse {
            token,
            user: UserResponse::from(user),
        })
    }

    /// Updates username and email on the actor's own record. The current
    /// password must verify, and the new email must not belong to someone else.
    #[instrument(skip(self, request))]
    pub async fn update_profile(
        &self,
        actor: &UserModel,
        target_id: &str,
        request: UpdateProfileRequest,
    ) -> Result<UserResponse, AppError> {
        info!(actor_id = %actor.id, target_id = %target_id, "Updating user profile");

        if actor.id != target_id {
            warn!(actor_id = %actor.id, target_id = %target_id, "Profile update on another user's record");
            return Err(AppError::Forbidden(
                "Users may only update their own profile".to_string(),
            ));
        }

        // The new email may only collide with the actor's own current record
        if let Some(other) = self.repository.find_by_email(&request.email).await? {
            if other.id != actor.id {
                warn!(email = %request.email, "Email already registered to another user");
                return Err(AppError::Conflict(
                    "Email is already registered to another user".to_string(),
                ));
            }
        }

        verify_password(&request.password, &actor.password_hash)?;

        let updated = self
            .repository
            .update_profile(&actor.id, &request.username, &request.email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        info!(user_id = %updated.id, "Profile updated successfully");
        Ok(UserResponse::from(updated))
    }

    /// Replaces the actor's password after verifying the old one.
    #[instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        actor: &UserModel,
        target_id: &str,
        request: ChangePasswordRequest,
    ) -> Result<UserResponse, AppError> {
        info!(actor_id = %actor.id, target_id = %target_id, "Changing user password");

        if actor.id != target_id {
            warn!(actor_id = %actor.id, target_id = %target_id, "Password change on another user's record");
            return Err(AppError::Forbidden(
                "Users may only change their own password".to_string(),
            ));
        }

        verify_password(&request.old_password, &actor.password_hash)?;

        let password_hash = hash_password(&request.new_password)?;
        let updated = self
            .repository
            .update_password(&actor.id, &password_hash)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        info!(user_id = %updated.id, "Password changed successfully");
        Ok(UserResponse::from(updated))
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| {
        warn!(error = %e, "Failed to hash password");
        AppError::Internal
    })
}

fn verify_password(password: &str, hash: &str) -> Result<(), AppError> {
    let matches = bcrypt::verify(password, hash).map_err(|e| {
        warn!(error = %e, "Password verification failed");
        AppError::Internal
    })?;
    if matches {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Wrong password".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::models::Role;
    use crate::user::repository::InMemoryUserRepository;

    fn service() -> (Arc<InMemoryUserRepository>, UserService) {
        let repo = Arc::new(InMemoryUserRepository::new());
        let service = UserService::new(repo.clone(), TokenConfig::new());
        (repo, service)
    }

    fn register_request(username: &str, email: &str, role: Role) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: "correct horse battery staple".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_register_success() {
        let (repo, service) = service();

        let response = service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();

        assert_eq!(response.username, "alice");
        assert_eq!(response.role, Role::Student);

        // Stored hash must not be the plaintext password
        let stored = repo.find_by_id(&response.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "correct horse battery staple");
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (_repo, service) = service();

        service
            .register(register_request("alice", "shared@example.com", Role::Student))
            .await
            .unwrap();

        let result = service
            .register(register_request("bob", "shared@example.com", Role::Instructor))
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_roundtrip() {
        let (_repo, service) = service();
        let registered = service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();

        let response = service
            .login(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "correct horse battery staple".to_string(),
            })
            .await
            .unwrap();

        assert!(!response.token.is_empty());
        assert_eq!(response.user.id, registered.id);
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let (_repo, service) = service();

        let result = service
            .login(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "whatever".to_string(),
            })
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (_repo, service) = service();
        service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();

        let result = service
            .login(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "not the password".to_string(),
            })
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_update_profile_requires_ownership() {
        let (repo, service) = service();
        let registered = service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();
        let actor = repo.find_by_id(&registered.id).await.unwrap().unwrap();

        let result = service
            .update_profile(
                &actor,
                "someone-else",
                UpdateProfileRequest {
                    username: "mallory".to_string(),
                    email: "mallory@example.com".to_string(),
                    password: "correct horse battery staple".to_string(),
                },
            )
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_email() {
        let (repo, service) = service();
        service
            .register(register_request("bob", "bob@example.com", Role::Instructor))
            .await
            .unwrap();
        let registered = service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();
        let actor = repo.find_by_id(&registered.id).await.unwrap().unwrap();

        let result = service
            .update_profile(
                &actor,
                &actor.id,
                UpdateProfileRequest {
                    username: "alice".to_string(),
                    email: "bob@example.com".to_string(),
                    password: "correct horse battery staple".to_string(),
                },
            )
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_profile_keeping_own_email() {
        let (repo, service) = service();
        let registered = service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();
        let actor = repo.find_by_id(&registered.id).await.unwrap().unwrap();

        // Changing only the username while keeping the same email is fine
        let updated = service
            .update_profile(
                &actor,
                &actor.id,
                UpdateProfileRequest {
                    username: "alicia".to_string(),
                    email: "alice@example.com".to_string(),
                    password: "correct horse battery staple".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.username, "alicia");
        assert_eq!(updated.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_change_password_then_login_with_new() {
        let (repo, service) = service();
        let registered = service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();
        let actor = repo.find_by_id(&registered.id).await.unwrap().unwrap();

        service
            .change_password(
                &actor,
                &actor.id,
                ChangePasswordRequest {
                    old_password: "correct horse battery staple".to_string(),
                    new_password: "a brand new passphrase".to_string(),
                },
            )
            .await
            .unwrap();

        // Old password no longer works
        let old_login = service
            .login(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "correct horse battery staple".to_string(),
            })
            .await;
        assert!(matches!(old_login.unwrap_err(), AppError::Unauthorized(_)));

        // New one does
        let new_login = service
            .login(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "a brand new passphrase".to_string(),
            })
            .await;
        assert!(new_login.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_wrong_old_password() {
        let (repo, service) = service();
        let registered = service
            .register(register_request("alice", "alice@example.com", Role::Student))
            .await
            .unwrap();
        let actor = repo.find_by_id(&registered.id).await.unwrap().unwrap();

        let result = service
            .change_password(
                &actor,
                &actor.id,
                ChangePasswordRequest {
                    old_password: "not the old password".to_string(),
                    new_password: "whatever comes next".to_string(),
                },
            )
            .await;

        assert!(matches!(result.unwrap_err(), AppError::Unauthorized(_)));
    }
}

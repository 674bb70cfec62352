use serde::{Deserialize, Serialize};

use crate::user::models::UserModel;

/// JWT claims identifying an authenticated user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthClaims {
    pub sub: String, // User id
    pub email: String,
    pub exp: usize, // Expiration timestamp (standard JWT claim)
    pub iat: usize, // Issued at timestamp (standard JWT claim)
}

/// The acting identity resolved by the auth middleware, available to handlers
/// as a request extension. Every core operation receives this already-resolved
/// user rather than raw claims.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserModel);

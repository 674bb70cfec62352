// Public API - what other modules can use
pub use middleware::jwt_auth;
pub use types::{AuthClaims, CurrentUser};

// Internal modules
mod middleware;
pub mod policy;
pub mod token;
pub mod types;

// Public API - what other modules can use
pub use handlers::{change_password, login, register, update_profile};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod types;

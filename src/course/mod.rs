// Public API - what other modules can use
pub use handlers::{
    create_course, delete_course, drop_course, enroll, get_course, list_by_instructor,
    list_by_student, list_courses, search_by_title, update_course,
};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod types;

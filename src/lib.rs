pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod follow;
pub mod forms;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod posts;
pub mod render;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;
pub mod views;

// Re-export commonly used items for tests / external users
pub use config::Settings;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;

pub mod auth;
pub mod content;
pub mod error;
pub mod gateway;
pub mod matching;
pub mod models;
pub mod openapi;
pub mod password;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod security;
pub mod session;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;

pub mod auth;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod issues;
pub mod models;
pub mod openapi;
pub mod profiles;
pub mod routes;
pub mod service;
pub mod store; // document store collaborator + in-memory implementation

// Re-export commonly used items for tests / external users
pub use config::HostelConfig;
pub use routes::{config, AppState};
pub use service::HostelService;

// Pushcast Control Plane Library
// Decision: Router construction lives in the library so tests drive it with tower::oneshot

// HTTP API routes and DTOs
pub mod api;

// Router assembly and health
pub mod app;

// Server configuration
pub mod config;

pub use app::build_router;
pub use config::ServerConfig;

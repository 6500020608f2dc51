pub mod analyze;
pub mod auth;
pub mod daily;
pub mod debate;
pub mod flashcards;
pub mod history;
pub mod interview;
pub mod middleware;
pub mod mistakes;
pub mod rest;
pub mod roleplay;
pub mod router;
pub mod state;
pub mod token;
pub mod translate;
pub mod tutor;

// Re-export the router builder to make it easily accessible
// to the binary that serves it and to the integration tests.
pub use middleware::require_auth;
pub use router::build_router;

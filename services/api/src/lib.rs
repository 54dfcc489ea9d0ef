//! Session collection service: payload validation, file-backed storage and
//! the admin review endpoints.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;

pub use routes::create_router;
pub use state::AppState;

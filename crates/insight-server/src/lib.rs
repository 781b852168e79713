//! Insight HTTP server: authenticated document upload and Q&A over `/api`.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, IdentityProvider, StaticIdentityProvider};
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;

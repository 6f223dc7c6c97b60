//! HTTP surface over the mirror
//!
//! Every route is served at the root and again under `/api`.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

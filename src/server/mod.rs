//! HTTP facade over search and synthesis
//!
//! `POST /search`, `POST /chat` and `POST /api/query` share one [`AppState`];
//! failures are returned as `{"detail": ...}` with a status derived from the
//! error kind.


mod api;
mod errors;
mod handlers;
mod types;

pub use api::{OriginPolicy, cors_layer, router, run_server};
pub use handlers::{AppState, CITATION_LIMIT};
pub use types::*;

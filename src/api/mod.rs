//! HTTP API
//!
//! Thin presentation layer over the market engine; all trading rules live
//! in `crate::market`.

pub mod routes;

pub use routes::{create_router, AppState};

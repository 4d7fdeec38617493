//! StockSim Backend Library
//!
//! Exposes the market simulation engine and its supporting modules for
//! use by the server binary and integration tests.

pub mod api;
pub mod db;
pub mod market;
pub mod models;
pub mod wallet;

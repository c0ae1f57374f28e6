//! Locksum API Library
//!
//! This crate contains the HTTP server components for Locksum: auth,
//! the entitlement gateway, and the routes that sit behind it.

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod insights;
pub mod plaid;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

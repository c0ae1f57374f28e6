//! Locksum Shared Types and Utilities
//!
//! This crate contains the domain vocabulary and database utilities shared
//! across the Locksum platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;

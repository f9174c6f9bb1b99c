//! # Cifra Common Library
//!
//! Shared code for the chord sheet editor service:
//! - Bootstrap configuration loading
//! - Request validation schemas
//! - Database initialization, connection pool and stored-procedure gateway
//! - Song row model
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod validation;

pub use error::{Error, Result};

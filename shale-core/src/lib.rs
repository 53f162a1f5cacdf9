//! Shale Core Library
//!
//! This crate provides the shared pieces of the Shale static asset
//! server: configuration management, error handling, and the
//! middleware chain applied around the file-serving handler.

pub mod config;
pub mod error;
pub mod middleware;

pub use error::{Error, Result};

/// Shale version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! # Skymirror Common Library
//!
//! Shared code for the skymirror services including:
//! - Error types (`Error`, `Result`)
//! - Configuration file loading helpers
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};

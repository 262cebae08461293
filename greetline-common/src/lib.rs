//! # Greetline Common Library
//!
//! Shared code for the greetline voicemail-greeting service:
//! - Error type
//! - Configuration loading
//! - Database schema, records and the greeting store

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};

//! # Archival ingest common library
//!
//! Shared code for the ingestion tools:
//! - Error and result types
//! - TOML configuration with environment overrides
//! - Tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};

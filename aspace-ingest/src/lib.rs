//! Archival record ingestion client
//!
//! Pushes records into an archival management backend over its REST API:
//! batch imports, find-or-create of shared entities, reference linking and
//! EAD conversion, with bounded concurrency and per-unit outcome tracking.

pub mod client;
pub mod diagnostics;
pub mod models;
pub mod workflow;

pub use client::{ClientOptions, IngestClient};
pub use diagnostics::DiagnosticsLog;

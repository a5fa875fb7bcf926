//! Test helper utilities
//!
//! Shared setup for the client integration tests

#![allow(dead_code)]

pub mod mock_backend;

pub use mock_backend::{MockBackend, RecordedRequest, TEST_PASSWORD, TEST_TOKEN};

use aspace_ingest::client::session::Session;
use aspace_ingest::{ClientOptions, DiagnosticsLog, IngestClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A running mock backend and a client pointed at it
///
/// Keep the struct alive for the duration of the test; it owns the temp
/// directory holding the diagnostics file.
pub struct TestEnv {
    pub backend: Arc<MockBackend>,
    pub client: IngestClient,
    pub base_uri: String,
    pub diagnostics_path: PathBuf,
    pub dir: TempDir,
}

impl TestEnv {
    pub async fn start() -> Self {
        Self::start_with(TEST_PASSWORD, 4).await
    }

    pub async fn start_with(password: &str, max_concurrency: usize) -> Self {
        let backend = MockBackend::new();
        let base_uri = backend.start().await;
        let dir = TempDir::new().unwrap();
        let diagnostics_path = dir.path().join("error_responses");

        let session = Session::new(&base_uri, "admin", password, Duration::from_secs(10)).unwrap();
        let diagnostics = DiagnosticsLog::open(&diagnostics_path).unwrap();
        let client = IngestClient::new(
            session,
            diagnostics,
            ClientOptions {
                max_concurrency,
                search_page_size: 250,
            },
        );

        Self {
            backend,
            client,
            base_uri,
            diagnostics_path,
            dir,
        }
    }

    /// Contents of the diagnostics sink so far
    pub fn diagnostics(&self) -> String {
        std::fs::read_to_string(&self.diagnostics_path).unwrap_or_default()
    }
}

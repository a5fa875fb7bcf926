//! Ingestion client
//!
//! [`IngestClient`] ties the session, multiplexer, resolver, correlator and
//! tracker together. Work is queued with the `queue_*` methods and sent by
//! [`IngestClient::run`]; completions come back to the run loop, which
//! classifies them, updates counters and the id mapping, and queues any
//! follow-up (a converted document's upload).
//!
//! The `queue_*` methods are async only so the session token can be acquired
//! lazily; an auth failure surfaces there and stops the pass.

pub mod correlator;
pub mod linker;
pub mod lookup;
pub mod multiplexer;
pub mod resolver;
pub mod search;
pub mod session;
pub mod submitter;
pub mod tracker;

use crate::diagnostics::{DiagnosticsLog, Phase};
use crate::models::{ModelType, Record, ReferenceField};
use aspace_common::config::TomlConfig;
use aspace_common::{Error, Result};
use correlator::{CorrelationKey, IdMapping};
use linker::{LinkShape, RecordLookup};
use multiplexer::Multiplexer;
use reqwest::RequestBuilder;
use resolver::EntityResolver;
use session::{Session, XML_CONTENT_TYPE};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use submitter::ReplyResult;
use tracker::{Outcome, OutcomeSummary, OutcomeTracker};

/// Path that turns an EAD document into importable records
pub const EAD_CONVERSION_PATH: &str = "/plugins/jsonmodel_from_format/resource/ead";

/// What a queued request was for
#[derive(Debug, Clone)]
pub enum Operation {
    Upload {
        label: String,
        correlate: Option<CorrelationKey>,
    },
    Update {
        label: String,
    },
    Conversion {
        label: String,
        repo_id: i64,
        correlate: Option<CorrelationKey>,
    },
}

/// Value a finished request hands back to the run loop
#[derive(Debug)]
pub struct Completion {
    pub operation: Operation,
    pub reply: ReplyResult,
}

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub max_concurrency: usize,
    pub search_page_size: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            search_page_size: search::DEFAULT_PAGE_SIZE,
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            search_page_size: config.search_page_size,
        }
    }
}

pub struct IngestClient {
    session: Arc<Session>,
    tracker: Arc<OutcomeTracker>,
    id_mapping: Arc<IdMapping>,
    diagnostics: Arc<DiagnosticsLog>,
    resolver: EntityResolver,
    mux: Multiplexer<Completion>,
    options: ClientOptions,
}

impl IngestClient {
    pub fn new(session: Session, diagnostics: DiagnosticsLog, options: ClientOptions) -> Self {
        let session = Arc::new(session);
        let tracker = Arc::new(OutcomeTracker::new());
        let diagnostics = Arc::new(diagnostics);
        let resolver = EntityResolver::new(
            session.clone(),
            tracker.clone(),
            diagnostics.clone(),
            options.search_page_size,
        );

        Self {
            session,
            tracker,
            id_mapping: Arc::new(IdMapping::new()),
            diagnostics,
            resolver,
            mux: Multiplexer::new(options.max_concurrency),
            options,
        }
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        let session = Session::from_config(config)?;
        let diagnostics = match &config.diagnostics_file {
            Some(path) => DiagnosticsLog::open(path)?,
            None => DiagnosticsLog::disabled(),
        };
        Ok(Self::new(session, diagnostics, ClientOptions::from_config(config)))
    }

    /// Replace the id mapping, e.g. with one loaded from an earlier pass
    pub fn with_id_mapping(mut self, mapping: IdMapping) -> Self {
        self.id_mapping = Arc::new(mapping);
        self
    }

    pub async fn authorize(&self) -> Result<()> {
        self.session.authorize().await.map(|_| ())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tracker(&self) -> &OutcomeTracker {
        &self.tracker
    }

    pub fn summary(&self) -> OutcomeSummary {
        self.tracker.snapshot()
    }

    pub fn id_mapping(&self) -> &IdMapping {
        &self.id_mapping
    }

    pub fn max_concurrency(&self) -> usize {
        self.options.max_concurrency
    }

    /// Queue a batch import; `label` keys log lines and diagnostics
    ///
    /// Records without a uri get a temporary one.
    pub async fn queue_batch(&self, repo_id: i64, records: Vec<Record>, label: &str) -> Result<()> {
        self.queue_batch_inner(repo_id, records, label, None).await
    }

    /// Queue a batch import whose `saved` map feeds the id mapping
    pub async fn queue_correlated_batch(
        &self,
        repo_id: i64,
        records: Vec<Record>,
        label: &str,
        key: CorrelationKey,
    ) -> Result<()> {
        self.queue_batch_inner(repo_id, records, label, Some(key)).await
    }

    async fn queue_batch_inner(
        &self,
        repo_id: i64,
        mut records: Vec<Record>,
        label: &str,
        correlate: Option<CorrelationKey>,
    ) -> Result<()> {
        for record in records.iter_mut().filter(|r| r.uri().is_none()) {
            record.assign_temp_uri();
        }
        let body = submitter::encode_batch(&records)?;
        let token = self.session.authorize().await?;
        self.enqueue_upload(token, repo_id, body, label, correlate, true)
    }

    fn enqueue_upload(
        &self,
        token: &str,
        repo_id: i64,
        body: String,
        label: &str,
        correlate: Option<CorrelationKey>,
        counted: bool,
    ) -> Result<()> {
        let request = self
            .session
            .post_json_with(&submitter::batch_import_path(repo_id), token, body)?;
        if counted {
            self.tracker.increment_total();
        }
        tracing::debug!(label, repo_id, "Queued batch import");
        self.enqueue(
            Operation::Upload {
                label: label.to_string(),
                correlate,
            },
            request,
        );
        Ok(())
    }

    fn enqueue(&self, operation: Operation, request: RequestBuilder) {
        self.mux.queue(async move {
            let reply = submitter::send(request).await;
            Completion { operation, reply }
        });
    }

    /// Queue a full-record update to the record's own uri
    pub async fn queue_update(&self, record: &Record) -> Result<()> {
        let Some(uri) = record.uri() else {
            return Err(Error::InvalidInput(format!(
                "Cannot update {} without a uri",
                record.model_type()
            )));
        };
        let label = record
            .identifier()
            .filter(|id| !id.is_empty())
            .map(|id| id.query_phrase())
            .unwrap_or_else(|| uri.to_string());

        let body = serde_json::to_string(record)?;
        let request = self.session.post_json(uri, body).await?;
        self.tracker.increment_total();
        tracing::debug!(label = %label, uri, "Queued update");
        self.enqueue(Operation::Update { label }, request);
        Ok(())
    }

    /// Queue conversion of an EAD document; the converted records are
    /// uploaded to `repo_id` as part of the same unit of work
    pub async fn queue_conversion(&self, path: &Path, repo_id: i64) -> Result<()> {
        let xml = tokio::fs::read(path).await?;
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let request = self
            .session
            .request(reqwest::Method::POST, EAD_CONVERSION_PATH)
            .await?
            .header(reqwest::header::CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(xml);

        self.tracker.increment_total();
        tracing::debug!(file = %label, repo_id, "Queued conversion");
        self.enqueue(
            Operation::Conversion {
                label,
                repo_id,
                correlate: CorrelationKey::for_ead_file(path),
            },
            request,
        );
        Ok(())
    }

    /// Send everything queued, including follow-ups queued along the way
    pub async fn run(&self) -> OutcomeSummary {
        let completed = self.mux.run(|completion| self.handle_completion(completion)).await;
        let summary = self.summary();
        tracing::info!(completed, %summary, "Run finished");
        summary
    }

    fn handle_completion(&self, completion: Completion) {
        match completion.operation {
            Operation::Upload { label, correlate } => {
                let outcome = submitter::classify_import(&completion.reply);
                report_outcome(&self.diagnostics, Phase::Upload, &label, &outcome);
                self.tracker.record(&outcome);
                if let (Some(key), Some(payload)) = (correlate, outcome.payload()) {
                    if correlator::correlate(&self.id_mapping, &key, payload).is_none() {
                        tracing::warn!(label = %label, external_id = %key.external_id, "No saved record to correlate");
                    }
                }
            }
            Operation::Update { label } => {
                let outcome = submitter::classify_import(&completion.reply);
                report_outcome(&self.diagnostics, Phase::Update, &label, &outcome);
                self.tracker.record(&outcome);
            }
            Operation::Conversion {
                label,
                repo_id,
                correlate,
            } => {
                match submitter::classify_conversion(&completion.reply) {
                    Outcome::Succeeded(Some(converted)) => {
                        tracing::info!(file = %label, "Converted document, queueing upload");
                        if let Err(e) = self.queue_converted(&label, repo_id, &converted, correlate) {
                            tracing::error!(file = %label, error = %e, "Failed to queue converted upload");
                            self.diagnostics.error(Phase::Upload, &label, &e);
                        }
                    }
                    outcome => {
                        report_outcome(&self.diagnostics, Phase::Conversion, &label, &outcome);
                        self.tracker.record(&outcome);
                    }
                }
            }
        }
    }

    /// Upload converted records without counting a second unit of work
    fn queue_converted(
        &self,
        label: &str,
        repo_id: i64,
        converted: &serde_json::Value,
        correlate: Option<CorrelationKey>,
    ) -> Result<()> {
        let token = self
            .session
            .token()
            .ok_or_else(|| Error::Auth("No session token for converted upload".to_string()))?;
        let body = serde_json::to_string(converted)?;
        self.enqueue_upload(token, repo_id, body, label, correlate, false)
    }

    /// Find-or-create a shared entity; see [`EntityResolver::resolve`]
    pub async fn resolve(&self, repo_id: i64, entity: Record) -> Result<Option<String>> {
        self.resolver.resolve(repo_id, entity).await
    }

    pub async fn resolve_record(&self, kind: ModelType, lookup: &RecordLookup) -> Result<Option<Record>> {
        linker::resolve_record(
            &self.session,
            &self.diagnostics,
            self.options.search_page_size,
            kind,
            lookup,
        )
        .await
    }

    /// Add references to an archival record and queue it as an update
    ///
    /// Returns how many references were new. The update is queued either way.
    pub async fn queue_link(
        &self,
        mut record: Record,
        refs: &[String],
        field: ReferenceField,
        shape: &LinkShape,
    ) -> Result<usize> {
        let model = record.model_type();
        let Some(archival) = record.as_archival_mut() else {
            return Err(Error::InvalidInput(format!("Cannot link references onto {}", model)));
        };
        let added = linker::merge_references(archival, field, refs, shape);
        tracing::debug!(field = field.as_str(), added, "Merged references");
        self.queue_update(&record).await?;
        Ok(added)
    }

    pub async fn classification_map(&self, repo_id: i64) -> Result<BTreeMap<String, String>> {
        lookup::classification_map(
            &self.session,
            &self.diagnostics,
            repo_id,
            self.options.max_concurrency,
        )
        .await
    }
}

/// Log a finished unit of work; failures also go to the diagnostics sink
pub(crate) fn report_outcome(diagnostics: &DiagnosticsLog, phase: Phase, label: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Succeeded(_) => {
            tracing::info!(phase = %phase, key = label, "Request succeeded");
        }
        Outcome::TransportFailed { status: Some(status), body } => {
            tracing::warn!(phase = %phase, key = label, status, "Request failed");
            diagnostics.response(phase, label, body);
        }
        Outcome::TransportFailed { status: None, body } => {
            tracing::warn!(phase = %phase, key = label, error = %body, "Request failed without response");
            diagnostics.error(phase, label, body);
        }
        Outcome::ApplicationRejected { errors, body } => {
            tracing::warn!(phase = %phase, key = label, errors = %errors, "Request rejected");
            diagnostics.response(phase, label, body);
        }
    }
}

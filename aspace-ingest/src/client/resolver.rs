//! Find-or-create for shared entities (agents, subjects, classifications)
//!
//! An entity is matched on one designated field (see [`Record::match_key`])
//! by case-sensitive equality against exact-phrase search hits. No hit means
//! the entity is created as a single-record batch.
//!
//! Repository-scoped types (classifications and their terms) only match hits
//! inside the target repository. Agents and subjects are global.
//!
//! Resolution is serialised per (model type, repository, match key) and
//! remembered for the life of the resolver, so two callers racing on the same
//! new entity within this process create it once. Writers outside the process
//! can still race a search against a create; that remains best-effort.

use super::correlator::saved_uri_for;
use super::search::search_records;
use super::session::Session;
use super::submitter::{self, batch_import_path};
use super::tracker::{Outcome, OutcomeTracker};
use super::report_outcome;
use crate::diagnostics::{DiagnosticsLog, Phase};
use crate::models::{ModelType, Record};
use aspace_common::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolutionKey {
    model: ModelType,
    /// `None` for types shared across repositories
    repo_id: Option<i64>,
    match_key: String,
}

pub struct EntityResolver {
    session: Arc<Session>,
    tracker: Arc<OutcomeTracker>,
    diagnostics: Arc<DiagnosticsLog>,
    page_size: u32,
    key_locks: Mutex<HashMap<ResolutionKey, Arc<tokio::sync::Mutex<()>>>>,
    resolved: Mutex<HashMap<ResolutionKey, String>>,
}

impl EntityResolver {
    pub fn new(
        session: Arc<Session>,
        tracker: Arc<OutcomeTracker>,
        diagnostics: Arc<DiagnosticsLog>,
        page_size: u32,
    ) -> Self {
        Self {
            session,
            tracker,
            diagnostics,
            page_size: page_size.max(1),
            key_locks: Mutex::new(HashMap::new()),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &ResolutionKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the key's lock once no other resolution holds a handle to it
    ///
    /// Handles are only cloned under the map lock, so a count of two (map
    /// plus ours) means nobody else is waiting.
    fn release_key_lock(&self, key: &ResolutionKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(|p| p.into_inner());
        let idle = locks
            .get(key)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(key);
        }
    }

    fn cached(&self, key: &ResolutionKey) -> Option<String> {
        self.resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn remember(&self, key: ResolutionKey, uri: &str) {
        self.resolved
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, uri.to_string());
    }

    /// Find an equivalent entity or create one; returns its URI
    ///
    /// `Ok(None)` means resolution failed in a recorded, non-fatal way.
    pub async fn resolve(&self, repo_id: i64, entity: Record) -> Result<Option<String>> {
        let model = entity.model_type();
        let Some(match_key) = entity.match_key().map(str::to_string) else {
            tracing::warn!(model = %model, "Entity has no match key, not resolving");
            return Ok(None);
        };

        let key = ResolutionKey {
            model,
            repo_id: model.is_repository_scoped().then_some(repo_id),
            match_key,
        };
        let lock = self.key_lock(&key);
        let resolved = {
            let _guard = lock.lock().await;
            self.resolve_locked(repo_id, entity, &key).await
        };
        self.release_key_lock(&key, lock);
        resolved
    }

    async fn resolve_locked(
        &self,
        repo_id: i64,
        mut entity: Record,
        key: &ResolutionKey,
    ) -> Result<Option<String>> {
        let model = key.model;
        let match_key = key.match_key.as_str();

        if let Some(uri) = self.cached(key) {
            tracing::debug!(model = %model, key = match_key, uri = %uri, "Entity already resolved");
            return Ok(Some(uri));
        }

        let Some(hits) = search_records(
            &self.session,
            &self.diagnostics,
            model,
            match_key,
            self.page_size,
        )
        .await?
        else {
            return Ok(None);
        };

        if let Some(uri) = find_exact(&hits, model, match_key, key.repo_id) {
            tracing::info!(model = %model, key = match_key, uri = %uri, "Found existing entity");
            self.remember(key.clone(), &uri);
            return Ok(Some(uri));
        }

        let created = self.create(repo_id, &mut entity, match_key).await?;
        if let Some(uri) = &created {
            tracing::info!(model = %model, key = match_key, uri = %uri, "Created entity");
            self.remember(key.clone(), uri);
        }
        Ok(created)
    }

    /// Submit the entity as a single-record batch and await the reply
    async fn create(&self, repo_id: i64, entity: &mut Record, label: &str) -> Result<Option<String>> {
        let temp_uri = entity.assign_temp_uri();
        let body = submitter::encode_batch(std::slice::from_ref(entity))?;
        let request = self
            .session
            .post_json(&batch_import_path(repo_id), body)
            .await?;

        self.tracker.increment_total();
        let reply = submitter::send(request).await;
        let outcome = submitter::classify_import(&reply);
        report_outcome(&self.diagnostics, Phase::Upload, label, &outcome);
        self.tracker.record(&outcome);

        let Outcome::Succeeded(payload) = outcome else {
            return Ok(None);
        };
        let uri = payload.as_ref().and_then(|p| saved_uri_for(p, &temp_uri));
        if uri.is_none() {
            tracing::warn!(key = label, "Create succeeded but reply carried no saved reference");
        }
        Ok(uri)
    }
}

/// URI of the first hit of `model` whose match key equals `key` exactly
///
/// With `repo_id` set, hits outside that repository are ignored.
pub fn find_exact(hits: &[Record], model: ModelType, key: &str, repo_id: Option<i64>) -> Option<String> {
    let scope = repo_id.map(|repo| format!("/repositories/{}/", repo));
    hits.iter()
        .filter(|hit| hit.model_type() == model)
        .filter(|hit| hit.match_key() == Some(key))
        .filter_map(|hit| hit.uri())
        .find(|uri| scope.as_deref().map_or(true, |prefix| uri.starts_with(prefix)))
        .map(str::to_string)
}

//! Record lookup, reference merging and field merging
//!
//! The update itself is queued by [`super::IngestClient::queue_link`]; this
//! module holds the pieces that decide what gets sent.

use super::search::search_records;
use super::session::Session;
use super::submitter;
use crate::diagnostics::{DiagnosticsLog, Phase};
use crate::models::{ArchivalRecord, IdentifierTuple, ModelType, Record, Reference, ReferenceField};
use aspace_common::{Error, Result};
use reqwest::StatusCode;
use serde_json::{Map, Value};

/// How to find the archival record a link or merge targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordLookup {
    /// Direct fetch by persisted id
    ById { repo_id: i64, id: i64 },
    /// Exact-phrase search on the identifier tuple, optionally limited to one repository
    ByIdentifier {
        tuple: IdentifierTuple,
        repo_id: Option<i64>,
    },
}

impl RecordLookup {
    /// Key used in log lines and diagnostics entries
    pub fn label(&self) -> String {
        match self {
            RecordLookup::ById { repo_id, id } => format!("{}:{}", repo_id, id),
            RecordLookup::ByIdentifier { tuple, .. } => tuple.query_phrase(),
        }
    }
}

/// Shape of the reference objects appended by a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkShape {
    /// `{ref}`
    Plain,
    /// `{role, ref}`
    Role(String),
}

impl LinkShape {
    fn reference(&self, target: &str) -> Reference {
        match self {
            LinkShape::Plain => Reference::new(target),
            LinkShape::Role(role) => Reference::with_role(target, role.clone()),
        }
    }
}

/// Append references not already present; returns how many were added
///
/// A reference counts as present when an entry with the same target and
/// role exists, so linking twice leaves the collection unchanged.
pub fn merge_references(
    record: &mut ArchivalRecord,
    field: ReferenceField,
    refs: &[String],
    shape: &LinkShape,
) -> usize {
    let collection = record.references_mut(field);
    let mut added = 0;
    for target in refs {
        let candidate = shape.reference(target);
        let present = collection
            .iter()
            .any(|r| r.target == candidate.target && r.role == candidate.role);
        if !present {
            collection.push(candidate);
            added += 1;
        }
    }
    added
}

/// Fetch the archival record `lookup` names
///
/// `Ok(None)` covers not-found and recorded failures; only auth failures
/// propagate.
pub async fn resolve_record(
    session: &Session,
    diagnostics: &DiagnosticsLog,
    page_size: u32,
    kind: ModelType,
    lookup: &RecordLookup,
) -> Result<Option<Record>> {
    let Some(collection) = kind.collection_path().filter(|_| is_archival(kind)) else {
        return Err(Error::InvalidInput(format!(
            "Cannot resolve records of type {}",
            kind
        )));
    };

    match lookup {
        RecordLookup::ById { repo_id, id } => {
            let path = format!("/repositories/{}/{}/{}", repo_id, collection, id);
            fetch_record(session, diagnostics, kind, &path, &lookup.label()).await
        }
        RecordLookup::ByIdentifier { tuple, repo_id } => {
            if tuple.is_empty() {
                tracing::warn!(kind = %kind, "Empty identifier, nothing to look up");
                return Ok(None);
            }
            let Some(hits) =
                search_records(session, diagnostics, kind, &tuple.query_phrase(), page_size).await?
            else {
                return Ok(None);
            };
            let scope = repo_id.map(|repo| format!("/repositories/{}/", repo));
            let found = hits.into_iter().find(|hit| {
                hit.model_type() == kind
                    && hit.identifier().is_some_and(|id| id.matches(tuple))
                    && match (&scope, hit.uri()) {
                        (None, _) => true,
                        (Some(prefix), Some(uri)) => uri.starts_with(prefix.as_str()),
                        (Some(_), None) => false,
                    }
            });
            if found.is_none() {
                tracing::warn!(kind = %kind, identifier = %tuple, "No record with identifier");
            }
            Ok(found)
        }
    }
}

fn is_archival(kind: ModelType) -> bool {
    matches!(kind, ModelType::Accession | ModelType::Resource)
}

async fn fetch_record(
    session: &Session,
    diagnostics: &DiagnosticsLog,
    kind: ModelType,
    path: &str,
    label: &str,
) -> Result<Option<Record>> {
    let request = session.get(path).await?;
    let reply = match submitter::send(request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(path, error = %e, "Record fetch failed");
            diagnostics.error(Phase::Lookup, label, &e);
            return Ok(None);
        }
    };

    if reply.status == StatusCode::NOT_FOUND {
        tracing::warn!(path, "Record not found");
        return Ok(None);
    }
    if !reply.status.is_success() {
        tracing::warn!(path, status = %reply.status, "Record fetch rejected");
        diagnostics.response(Phase::Lookup, label, &reply.body);
        return Ok(None);
    }

    match serde_json::from_str::<Record>(&reply.body) {
        Ok(record) if record.model_type() == kind => Ok(Some(record)),
        Ok(record) => {
            tracing::warn!(path, expected = %kind, found = %record.model_type(), "Unexpected record type");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(path, error = %e, "Record did not decode");
            diagnostics.response(Phase::Lookup, label, &reply.body);
            Ok(None)
        }
    }
}

/// Which fields a merge overwrites and which it unions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePolicy {
    pub direct: Vec<String>,
    pub append: Vec<String>,
    /// Note types carried over from `notes`
    pub append_note_types: Vec<String>,
}

impl MergePolicy {
    /// Finding-aid data layered onto a resource created from an EAD document
    pub fn finding_aid_supplement() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            direct: strings(&[
                "title",
                "finding_aid_title",
                "id_0",
                "publish",
                "restrictions",
                "repository_processing_note",
                "finding_aid_status",
                "finding_aid_note",
            ]),
            append: strings(&[
                "revision_statements",
                "deaccessions",
                "external_documents",
                "rights_statements",
            ]),
            append_note_types: strings(&[
                "accruals",
                "accessrestrict",
                "userestrict",
                "RestrictedSpecColl",
                "RestrictedCurApprSpecColl",
            ]),
        }
    }
}

/// Layer `incoming` onto `existing` according to `policy`
///
/// Direct fields present on `incoming` overwrite; array fields and selected
/// notes are unioned, skipping structurally equal entries. The uri and model
/// type of `existing` are kept.
pub fn merge_fields(existing: &mut Record, incoming: &Record, policy: &MergePolicy) -> Result<()> {
    if existing.model_type() != incoming.model_type() {
        return Err(Error::InvalidInput(format!(
            "Cannot merge {} into {}",
            incoming.model_type(),
            existing.model_type()
        )));
    }

    let Value::Object(mut target) = serde_json::to_value(&*existing)? else {
        return Err(Error::Internal("Record did not serialise to an object".to_string()));
    };
    let Value::Object(source) = serde_json::to_value(incoming)? else {
        return Err(Error::Internal("Record did not serialise to an object".to_string()));
    };

    for field in &policy.direct {
        if let Some(value) = source.get(field).filter(|v| !v.is_null()) {
            target.insert(field.clone(), value.clone());
        }
    }

    for field in &policy.append {
        if let Some(Value::Array(items)) = source.get(field) {
            union_into(&mut target, field, items.iter());
        }
    }

    if let Some(Value::Array(notes)) = source.get("notes") {
        let selected = notes.iter().filter(|note| {
            note.get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| policy.append_note_types.iter().any(|wanted| wanted == t))
        });
        union_into(&mut target, "notes", selected);
    }

    *existing = serde_json::from_value(Value::Object(target))?;
    Ok(())
}

fn union_into<'a>(target: &mut Map<String, Value>, field: &str, items: impl Iterator<Item = &'a Value>) {
    let slot = target
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    if let Value::Array(existing) = slot {
        for item in items {
            if !existing.contains(item) {
                existing.push(item.clone());
            }
        }
    }
}

//! Result correlation
//!
//! Reads the `saved` map of a successful batch reply and maintains the
//! external-id to persisted-id table used by later passes.

use super::submitter::terminal_status;
use crate::models::ModelType;
use aspace_common::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// One `saved` entry: `temp_uri -> [permanent_uri, permanent_id]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEntry {
    pub temp_uri: String,
    pub uri: String,
    pub id: Option<i64>,
}

fn lenient_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Entries of the terminal `saved` map, empty when the reply carries none
pub fn saved_entries(payload: &Value) -> Vec<SavedEntry> {
    let Some(saved) = terminal_status(payload)
        .and_then(|status| status.get("saved"))
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };

    saved
        .iter()
        .filter_map(|(temp_uri, stored)| {
            let (uri, id) = match stored {
                Value::Array(parts) => (
                    parts.first()?.as_str()?.to_string(),
                    parts.get(1).and_then(lenient_id),
                ),
                Value::String(uri) => (uri.clone(), None),
                _ => return None,
            };
            let id = id.or_else(|| uri.rsplit('/').next().and_then(|tail| tail.parse().ok()));
            Some(SavedEntry {
                temp_uri: temp_uri.clone(),
                uri,
                id,
            })
        })
        .collect()
}

/// Permanent URI stored for `temp_uri`
///
/// When the backend keyed it differently, a map holding a single entry is
/// still unambiguous; anything larger yields `None`.
pub fn saved_uri_for(payload: &Value, temp_uri: &str) -> Option<String> {
    let mut entries = saved_entries(payload);
    if let Some(entry) = entries.iter().find(|entry| entry.temp_uri == temp_uri) {
        return Some(entry.uri.clone());
    }
    match entries.len() {
        1 => entries.pop().map(|entry| entry.uri),
        _ => None,
    }
}

/// Which external id an upload reports under, and which record type is primary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationKey {
    pub external_id: String,
    pub primary: ModelType,
}

impl CorrelationKey {
    pub fn new(external_id: impl Into<String>, primary: ModelType) -> Self {
        Self {
            external_id: external_id.into(),
            primary,
        }
    }

    /// EAD id of a converted document: its file stem
    pub fn for_ead_file(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        (!stem.is_empty()).then(|| Self::new(stem, ModelType::Resource))
    }
}

/// External business key to persisted database id
#[derive(Debug, Default)]
pub struct IdMapping {
    entries: Mutex<BTreeMap<String, i64>>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, i64>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Read a mapping previously written by [`IdMapping::write_json`]
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_entries(serde_json::from_str(&content)?))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, i64>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, external_id: impl Into<String>, id: i64) {
        self.lock().insert(external_id.into(), id);
    }

    pub fn get(&self, external_id: &str) -> Option<i64> {
        self.lock().get(external_id).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.lock().clone()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Record `external id -> persisted id` from a successful upload
///
/// Only entries whose key sits in the primary type's temp-URI namespace
/// qualify; linked records saved alongside (events, collection management)
/// are ignored.
pub fn correlate(mapping: &IdMapping, key: &CorrelationKey, payload: &Value) -> Option<i64> {
    let entry = saved_entries(payload)
        .into_iter()
        .find(|entry| key.primary.is_temp_uri(&entry.temp_uri))?;

    let Some(id) = entry.id else {
        tracing::warn!(
            external_id = %key.external_id,
            uri = %entry.uri,
            "Saved entry carries no persisted id"
        );
        return None;
    };

    mapping.insert(key.external_id.clone(), id);
    tracing::debug!(external_id = %key.external_id, id, "Recorded id mapping");
    Some(id)
}

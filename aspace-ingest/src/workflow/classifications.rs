//! Classification tree from dotted identifiers
//!
//! `MS` is a classification, `MS.1` a term under it, `MS.1.a` a term whose
//! parent is `MS.1`. The whole tree goes up as one batch linked through
//! temporary URIs.

use crate::client::tracker::OutcomeSummary;
use crate::client::IngestClient;
use crate::models::{Classification, ClassificationTerm, ModelType, Record, Reference};
use aspace_common::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

const SEGMENT_DELIMITER: char = '.';

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationRow {
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn load_classification_rows(path: &Path) -> Result<Vec<ClassificationRow>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn depth(identifier: &str) -> usize {
    identifier.matches(SEGMENT_DELIMITER).count()
}

fn published_extra(description: Option<&str>) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("description".to_string(), Value::from(description.unwrap_or("")));
    extra.insert("publish".to_string(), Value::Bool(true));
    extra
}

/// Classification and term records, parents before children
///
/// Rows whose root classification is missing are skipped with a warning.
pub fn build_classification_tree(rows: &[ClassificationRow]) -> Vec<Record> {
    let mut ordered: Vec<&ClassificationRow> = rows
        .iter()
        .filter(|row| !row.identifier.trim().is_empty())
        .collect();
    ordered.sort_by_key(|row| depth(&row.identifier));

    let mut uris: HashMap<&str, String> = HashMap::new();
    let mut classifications = Vec::new();
    let mut terms = Vec::new();

    for row in ordered {
        let identifier = row.identifier.as_str();
        let Some((parent, _)) = identifier.rsplit_once(SEGMENT_DELIMITER) else {
            let uri = ModelType::Classification.temp_uri();
            uris.insert(identifier, uri.clone());
            classifications.push(Record::Classification(Classification {
                uri: Some(uri),
                identifier: identifier.to_string(),
                title: Some(row.title.clone()),
                extra: published_extra(row.description.as_deref()),
            }));
            continue;
        };

        let root = parent.split(SEGMENT_DELIMITER).next().unwrap_or(parent);
        let Some(root_uri) = uris.get(root).cloned() else {
            warn!(identifier, root, "No classification for term, skipping");
            continue;
        };
        let parent_ref = uris
            .get(parent)
            .filter(|uri| **uri != root_uri)
            .map(|uri| Reference::new(uri.clone()));

        let uri = ModelType::ClassificationTerm.temp_uri();
        uris.insert(identifier, uri.clone());
        terms.push(Record::ClassificationTerm(ClassificationTerm {
            uri: Some(uri),
            identifier: identifier.to_string(),
            title: Some(row.title.clone()),
            classification: Some(Reference::new(root_uri)),
            parent: parent_ref,
            extra: published_extra(row.description.as_deref()),
        }));
    }

    classifications.extend(terms);
    classifications
}

pub async fn ingest_classifications(
    client: &IngestClient,
    repo_id: i64,
    rows: &[ClassificationRow],
) -> Result<OutcomeSummary> {
    let records = build_classification_tree(rows);
    info!(repo_id, records = records.len(), "Start Classifications");

    client.authorize().await?;
    client.queue_batch(repo_id, records, "classifications").await?;
    let summary = client.run().await;

    info!("Classifications done: {}", summary);
    Ok(summary)
}

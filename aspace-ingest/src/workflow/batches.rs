//! Pre-built batch pass and the finding-aid merge pass

use crate::client::linker::{merge_fields, MergePolicy, RecordLookup};
use crate::client::tracker::OutcomeSummary;
use crate::client::IngestClient;
use crate::models::{ModelType, Record};
use aspace_common::Result;
use std::path::Path;
use tracing::{info, warn};

/// Batches as stored on disk: a JSON array of record arrays
pub fn load_batches(path: &Path) -> Result<Vec<Vec<Record>>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// `id_0-id_1-id_2` of the first record, or `batch-<n>` when it has none
pub fn batch_label(batch: &[Record], index: usize) -> String {
    batch
        .first()
        .and_then(Record::identifier)
        .map(|id| id.label())
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| format!("batch-{}", index + 1))
}

/// Queue every batch and send them in one run
pub async fn ingest_batches(
    client: &IngestClient,
    repo_id: i64,
    batches: Vec<Vec<Record>>,
) -> Result<OutcomeSummary> {
    info!(repo_id, batches = batches.len(), "BEGIN INGEST");
    client.authorize().await?;

    for (index, batch) in batches.into_iter().enumerate() {
        if batch.is_empty() {
            continue;
        }
        let label = batch_label(&batch, index);
        client.queue_batch(repo_id, batch, &label).await?;
    }

    let summary = client.run().await;
    info!("{}", summary);
    Ok(summary)
}

fn ead_id(record: &Record) -> Option<&str> {
    record
        .as_archival()?
        .extra
        .get("ead_id")?
        .as_str()
        .filter(|id| !id.is_empty())
}

/// Merge each batch's lead resource into the resource its EAD id maps to
///
/// Batches whose lead record has no mapped EAD id, or whose mapped resource
/// can't be fetched, are imported as new records instead.
pub async fn merge_batches(
    client: &IngestClient,
    repo_id: i64,
    batches: Vec<Vec<Record>>,
    policy: &MergePolicy,
) -> Result<OutcomeSummary> {
    info!(repo_id, batches = batches.len(), mapped = client.id_mapping().len(), "BEGIN MERGE");
    client.authorize().await?;

    for (index, batch) in batches.into_iter().enumerate() {
        let Some(lead) = batch.first() else {
            continue;
        };

        let existing = match ead_id(lead).and_then(|id| client.id_mapping().get(id)) {
            Some(id) => {
                client
                    .resolve_record(ModelType::Resource, &RecordLookup::ById { repo_id, id })
                    .await?
            }
            None => None,
        };

        match existing {
            Some(mut existing) => {
                if let Err(e) = merge_fields(&mut existing, lead, policy) {
                    warn!(batch = index + 1, error = %e, "Merge failed, batch skipped");
                    continue;
                }
                client.queue_update(&existing).await?;
            }
            None => {
                let id_0 = lead
                    .identifier()
                    .and_then(|id| id.get(0).map(str::to_string))
                    .unwrap_or_default();
                let label = format!("{}:{}", id_0, ead_id(lead).unwrap_or(""));
                client.queue_batch(repo_id, batch, &label).await?;
            }
        }
    }

    let summary = client.run().await;
    info!("{}", summary);
    Ok(summary)
}

//! Two-phase entity linking
//!
//! Phase 1 resolves every entity (find-or-create); creates are awaited
//! inline, so nothing is left queued when it ends. Phase 2 groups the
//! resolved URIs by the archival record they belong on, fetches that record,
//! merges the references and sends the update. Each update is sent before
//! the next record is fetched so two groups landing on one record never
//! submit stale copies.

use crate::client::linker::{LinkShape, RecordLookup};
use crate::client::tracker::OutcomeSummary;
use crate::client::IngestClient;
use crate::models::{IdentifierTuple, ModelType, Record, ReferenceField};
use aspace_common::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

fn default_target_type() -> ModelType {
    ModelType::Accession
}

/// One entity to resolve and the archival record it links onto
#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
    pub entity: Record,
    pub target: IdentifierTuple,
    #[serde(default = "default_target_type")]
    pub target_type: ModelType,
    /// Role carried on the reference; agents only
    #[serde(default)]
    pub role: Option<String>,
}

pub fn load_link_requests(path: &Path) -> Result<Vec<LinkRequest>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkTarget {
    kind: ModelType,
    tuple: IdentifierTuple,
    field: ReferenceField,
    shape: LinkShape,
}

#[derive(Debug)]
struct LinkGroup {
    target: LinkTarget,
    uris: Vec<String>,
}

fn shape_for(entity: ModelType, role: Option<&str>) -> LinkShape {
    match (entity, role) {
        (ModelType::AgentPerson | ModelType::AgentCorporateEntity, Some(role)) => {
            LinkShape::Role(role.to_string())
        }
        (ModelType::AgentPerson | ModelType::AgentCorporateEntity, None) => {
            LinkShape::Role("source".to_string())
        }
        _ => LinkShape::Plain,
    }
}

/// Group resolved URIs by target, keeping first-seen order
fn group_links(resolved: Vec<(LinkTarget, String)>) -> Vec<LinkGroup> {
    let mut groups: Vec<LinkGroup> = Vec::new();
    for (target, uri) in resolved {
        match groups.iter_mut().find(|g| g.target == target) {
            Some(group) => {
                if !group.uris.contains(&uri) {
                    group.uris.push(uri);
                }
            }
            None => groups.push(LinkGroup {
                target,
                uris: vec![uri],
            }),
        }
    }
    groups
}

pub async fn link_entities(
    client: &IngestClient,
    repo_id: i64,
    requests: Vec<LinkRequest>,
) -> Result<OutcomeSummary> {
    info!(repo_id, requests = requests.len(), "BEGIN LINKING");
    client.authorize().await?;

    let resolved: Vec<Option<(LinkTarget, String)>> = stream::iter(requests)
        .map(|request| async move {
            let model = request.entity.model_type();
            let Some(field) = ReferenceField::for_entity(model) else {
                warn!(model = %model, "Entity type cannot be linked, skipping");
                return Ok::<_, aspace_common::Error>(None);
            };
            let uri = client.resolve(repo_id, request.entity).await?;
            Ok(uri.map(|uri| {
                let target = LinkTarget {
                    kind: request.target_type,
                    tuple: request.target,
                    field,
                    shape: shape_for(model, request.role.as_deref()),
                };
                (target, uri)
            }))
        })
        .buffered(client.max_concurrency())
        .try_collect()
        .await?;

    for group in group_links(resolved.into_iter().flatten().collect()) {
        let target = &group.target;
        if target.tuple.is_empty() {
            warn!("Link target has no identifier, skipping");
            continue;
        }
        let lookup = RecordLookup::ByIdentifier {
            tuple: target.tuple.clone(),
            repo_id: Some(repo_id),
        };
        let record = match client.resolve_record(target.kind, &lookup).await {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) if !e.is_fatal() => {
                warn!(identifier = %target.tuple.label(), error = %e, "Link target lookup failed, skipping");
                continue;
            }
            Err(e) => return Err(e),
        };

        info!(identifier = %target.tuple.label(), refs = group.uris.len(), "Linking");
        client
            .queue_link(record, &group.uris, target.field, &target.shape)
            .await?;
        client.run().await;
    }

    let summary = client.summary();
    info!("{}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, field: ReferenceField) -> LinkTarget {
        LinkTarget {
            kind: ModelType::Accession,
            tuple: IdentifierTuple::new([Some(id)]),
            field,
            shape: LinkShape::Plain,
        }
    }

    #[test]
    fn test_group_links_dedups_per_target() {
        let groups = group_links(vec![
            (target("1999", ReferenceField::Subjects), "/subjects/1".to_string()),
            (target("2000", ReferenceField::Subjects), "/subjects/1".to_string()),
            (target("1999", ReferenceField::Subjects), "/subjects/2".to_string()),
            (target("1999", ReferenceField::Subjects), "/subjects/1".to_string()),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].uris, vec!["/subjects/1", "/subjects/2"]);
        assert_eq!(groups[1].uris, vec!["/subjects/1"]);
    }

    #[test]
    fn test_agents_link_with_role() {
        assert_eq!(
            shape_for(ModelType::AgentPerson, Some("source")),
            LinkShape::Role("source".to_string())
        );
        assert_eq!(shape_for(ModelType::Subject, Some("source")), LinkShape::Plain);
    }

    #[test]
    fn test_request_defaults_to_accession_target() {
        let request: LinkRequest = serde_json::from_str(
            r#"{"entity": {"jsonmodel_type": "subject", "terms": [{"term": "Quilts"}]}, "target": ["1999", "001"]}"#,
        )
        .unwrap();
        assert_eq!(request.target_type, ModelType::Accession);
        assert_eq!(request.target.query_phrase(), "1999-001");
    }
}

//! Direct JSON fetches and the classification identifier map

use super::session::Session;
use super::submitter;
use crate::diagnostics::{DiagnosticsLog, Phase};
use aspace_common::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;

/// GET `path` and decode the body
///
/// 404 and recorded failures yield `Ok(None)`.
pub async fn fetch_json(
    session: &Session,
    diagnostics: &DiagnosticsLog,
    path: &str,
    query: &[(&str, &str)],
) -> Result<Option<Value>> {
    let request = session.get(path).await?.query(query);
    let reply = match submitter::send(request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(path, error = %e, "Lookup request failed");
            diagnostics.error(Phase::Lookup, path, &e);
            return Ok(None);
        }
    };

    if reply.status == StatusCode::NOT_FOUND {
        tracing::debug!(path, "Lookup target not found");
        return Ok(None);
    }
    if !reply.status.is_success() {
        tracing::warn!(path, status = %reply.status, "Lookup rejected");
        diagnostics.response(Phase::Lookup, path, &reply.body);
        return Ok(None);
    }

    match submitter::parse_body(&reply.body) {
        Some(value) => Ok(Some(value)),
        None => {
            tracing::warn!(path, "Lookup body is not JSON");
            diagnostics.response(Phase::Lookup, path, &reply.body);
            Ok(None)
        }
    }
}

const CLASSIFICATION_COLLECTIONS: [&str; 2] = ["classifications", "classification_terms"];

/// `identifier -> uri` for every classification and classification term in a repository
///
/// Records are fetched with at most `max_concurrency` requests in flight.
pub async fn classification_map(
    session: &Session,
    diagnostics: &DiagnosticsLog,
    repo_id: i64,
    max_concurrency: usize,
) -> Result<BTreeMap<String, String>> {
    let mut paths = Vec::new();
    for collection in CLASSIFICATION_COLLECTIONS {
        let list_path = format!("/repositories/{}/{}", repo_id, collection);
        let Some(ids) = fetch_json(session, diagnostics, &list_path, &[("all_ids", "true")]).await? else {
            continue;
        };
        let ids = ids.as_array().cloned().unwrap_or_default();
        paths.extend(
            ids.iter()
                .filter_map(Value::as_i64)
                .map(|id| format!("{}/{}", list_path, id)),
        );
    }

    let records: Vec<Option<Value>> = stream::iter(paths)
        .map(|path| async move { fetch_json(session, diagnostics, &path, &[]).await })
        .buffer_unordered(max_concurrency.max(1))
        .try_collect()
        .await?;

    let map: BTreeMap<String, String> = records
        .into_iter()
        .flatten()
        .filter_map(|record| {
            let identifier = record.get("identifier")?.as_str()?.to_string();
            let uri = record.get("uri")?.as_str()?.to_string();
            Some((identifier, uri))
        })
        .collect();

    tracing::info!(repo_id, entries = map.len(), "Loaded classification map");
    Ok(map)
}

//! Exact-phrase full-text search
//!
//! Used by find-or-create and by identifier lookups. Searches are awaited
//! directly rather than queued on the multiplexer.

use super::session::Session;
use super::submitter::{self, Reply};
use crate::diagnostics::{DiagnosticsLog, Phase};
use crate::models::{ModelType, Record};
use aspace_common::Result;
use serde::Deserialize;

/// Hits requested per lookup unless configured otherwise
pub const DEFAULT_PAGE_SIZE: u32 = 250;

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    json: Option<String>,
}

/// Quote a phrase for an exact match query
pub fn exact_phrase(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn search_path(model: ModelType) -> &'static str {
    match model {
        ModelType::Subject => "/search/subjects",
        _ => "/search",
    }
}

/// First page of 100%-match hits for `phrase` among records of `model`
///
/// `Ok(None)` means the search itself failed (logged, body kept for
/// diagnostics). Hits whose embedded JSON does not decode are skipped; an
/// undecodable result page yields no hits.
pub async fn search_records(
    session: &Session,
    diagnostics: &DiagnosticsLog,
    model: ModelType,
    phrase: &str,
    page_size: u32,
) -> Result<Option<Vec<Record>>> {
    let request = session.get(search_path(model)).await?.query(&[
        ("q", exact_phrase(phrase)),
        ("mm", "100%".to_string()),
        ("page", "1".to_string()),
        ("page_size", page_size.to_string()),
        ("type[]", model.as_str().to_string()),
    ]);

    let reply = match submitter::send(request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(model = %model, phrase, error = %e, "Search request failed");
            diagnostics.error(Phase::Search, phrase, &e);
            return Ok(None);
        }
    };

    if !reply.status.is_success() {
        tracing::warn!(model = %model, phrase, status = %reply.status, "Search rejected");
        diagnostics.response(Phase::Search, phrase, &reply.body);
        return Ok(None);
    }

    Ok(Some(decode_hits(&reply)))
}

fn decode_hits(reply: &Reply) -> Vec<Record> {
    let Ok(results) = serde_json::from_str::<SearchResults>(&reply.body) else {
        tracing::debug!("Search response did not decode, treating as no hits");
        return Vec::new();
    };

    results
        .results
        .into_iter()
        .filter_map(|hit| hit.json)
        .filter_map(|json| match serde_json::from_str::<Record>(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping search hit that does not decode");
                None
            }
        })
        .collect()
}

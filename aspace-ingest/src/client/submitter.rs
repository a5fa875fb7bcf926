//! Batch submission wire format and reply classification
//!
//! A batch is a JSON array of record payloads POSTed to
//! `/repositories/{repo}/batch_imports`. The reply is a JSON array of status
//! objects whose last element is the terminal status: `{saved: {...}}` or
//! `{errors: [...]}`. Updates reply with a single object carrying the same
//! `errors` convention.

use super::tracker::Outcome;
use crate::models::Record;
use aspace_common::Result;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;

/// Status and raw body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

pub type ReplyResult = std::result::Result<Reply, reqwest::Error>;

/// Send a request and buffer its body
pub async fn send(request: RequestBuilder) -> ReplyResult {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    Ok(Reply { status, body })
}

pub fn batch_import_path(repo_id: i64) -> String {
    format!("/repositories/{}/batch_imports", repo_id)
}

/// Serialise records in submission order
pub fn encode_batch(records: &[Record]) -> Result<String> {
    Ok(serde_json::to_string(records)?)
}

/// JSON body or `None` if it does not parse
pub fn parse_body(body: &str) -> Option<Value> {
    serde_json::from_str(body).ok()
}

/// The terminal status of a batch reply (last element) or an update reply
pub fn terminal_status(payload: &Value) -> Option<&Value> {
    match payload {
        Value::Array(statuses) => statuses.last(),
        Value::Object(_) => Some(payload),
        _ => None,
    }
}

/// Non-empty `errors` on the terminal status
fn rejection_errors(payload: &Value) -> Option<&Value> {
    let errors = terminal_status(payload)?.get("errors")?;
    let empty = match errors {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    };
    (!empty).then_some(errors)
}

/// The reply if it carries a success status, otherwise its transport failure
fn successful(reply: &ReplyResult) -> std::result::Result<&Reply, Outcome> {
    match reply {
        Err(e) => Err(Outcome::TransportFailed {
            status: e.status().map(|s| s.as_u16()),
            body: e.to_string(),
        }),
        Ok(reply) if !reply.status.is_success() => Err(Outcome::TransportFailed {
            status: Some(reply.status.as_u16()),
            body: reply.body.clone(),
        }),
        Ok(reply) => Ok(reply),
    }
}

/// Classify a batch import or record update reply
///
/// A 2xx body that does not parse counts as success without payload.
pub fn classify_import(reply: &ReplyResult) -> Outcome {
    let reply = match successful(reply) {
        Ok(reply) => reply,
        Err(failure) => return failure,
    };

    match parse_body(&reply.body) {
        Some(payload) => match rejection_errors(&payload) {
            Some(errors) => Outcome::ApplicationRejected {
                errors: errors.clone(),
                body: reply.body.clone(),
            },
            None => Outcome::Succeeded(Some(payload)),
        },
        None => Outcome::Succeeded(None),
    }
}

/// Classify a document conversion reply
///
/// Converted records come back as an array; an object means the backend
/// reported a conversion error.
pub fn classify_conversion(reply: &ReplyResult) -> Outcome {
    let reply = match successful(reply) {
        Ok(reply) => reply,
        Err(failure) => return failure,
    };

    match parse_body(&reply.body) {
        Some(payload @ Value::Array(_)) => Outcome::Succeeded(Some(payload)),
        Some(Value::Object(fields)) => Outcome::ApplicationRejected {
            errors: fields
                .get("error")
                .cloned()
                .unwrap_or_else(|| Value::Object(fields.clone())),
            body: reply.body.clone(),
        },
        _ => Outcome::ApplicationRejected {
            errors: Value::String("unparseable conversion response".to_string()),
            body: reply.body.clone(),
        },
    }
}

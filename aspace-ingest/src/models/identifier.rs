//! Four-part business identifiers (`id_0` .. `id_3`)
//!
//! Accessions and resources are named within a repository by up to four
//! components. Components arrive as strings or numbers; both normalise to
//! strings. Empty components count as absent, and trailing absent components
//! never take part in comparison.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Delimiter used when a tuple is flattened into a search phrase or label
pub const IDENTIFIER_DELIMITER: &str = "-";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentifierTuple([Option<String>; 4]);

impl IdentifierTuple {
    /// Build from up to four components; extras are ignored
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let mut components: [Option<String>; 4] = Default::default();
        for (slot, part) in components.iter_mut().zip(parts) {
            *slot = part.map(Into::into).filter(|s| !s.trim().is_empty());
        }
        Self(components)
    }

    /// Components up to and including the last present one
    pub fn components(&self) -> &[Option<String>] {
        let len = self
            .0
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |idx| idx + 1);
        &self.0[..len]
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|c| c.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.components().is_empty()
    }

    /// Exact match after dropping trailing absent components on both sides
    pub fn matches(&self, other: &IdentifierTuple) -> bool {
        self.components() == other.components()
    }

    /// Phrase used for full-text lookup; interior gaps become empty segments
    pub fn query_phrase(&self) -> String {
        self.components()
            .iter()
            .map(|c| c.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(IDENTIFIER_DELIMITER)
    }

    /// Short label of the first three present components, used in log lines
    pub fn label(&self) -> String {
        self.0[..3]
            .iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(IDENTIFIER_DELIMITER)
    }
}

impl fmt::Display for IdentifierTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query_phrase())
    }
}

/// Normalise a wire value into an identifier component
pub fn component_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Serialize for IdentifierTuple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.components().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IdentifierTuple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        if raw.len() > 4 {
            return Err(serde::de::Error::invalid_length(raw.len(), &"at most 4 components"));
        }
        Ok(Self::new(raw.iter().map(component_from_value)))
    }
}

/// Serde helper for individual `id_N` fields that may be numbers on the wire
pub(crate) mod lenient_component {
    use super::component_from_value;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(component_from_value))
    }
}

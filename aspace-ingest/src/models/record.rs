//! Record payloads
//!
//! One variant per model type, discriminated by `jsonmodel_type` on the wire.
//! Fields the client reasons about (uri, identifiers, names, terms, reference
//! collections) are typed; everything else rides along in a flattened map so
//! a fetched record can be re-submitted without losing data.

use super::identifier::{lenient_component, IdentifierTuple};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Model type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Accession,
    Resource,
    AgentPerson,
    AgentCorporateEntity,
    Subject,
    Classification,
    ClassificationTerm,
    Event,
    CollectionManagement,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Accession => "accession",
            ModelType::Resource => "resource",
            ModelType::AgentPerson => "agent_person",
            ModelType::AgentCorporateEntity => "agent_corporate_entity",
            ModelType::Subject => "subject",
            ModelType::Classification => "classification",
            ModelType::ClassificationTerm => "classification_term",
            ModelType::Event => "event",
            ModelType::CollectionManagement => "collection_management",
        }
    }

    /// Prefix shared by every client-minted temporary URI of this type
    pub fn import_namespace(&self) -> &'static str {
        match self {
            ModelType::Accession => "/repositories/import/accessions/",
            ModelType::Resource => "/repositories/import/resources/",
            ModelType::AgentPerson => "/agents/people/",
            ModelType::AgentCorporateEntity => "/agents/corporate_entities/",
            ModelType::Subject => "/subjects/",
            ModelType::Classification => "/repositories/import/classifications/",
            ModelType::ClassificationTerm => "/repositories/import/classification_terms/",
            ModelType::Event => "/repositories/import/events/",
            ModelType::CollectionManagement => "/repositories/import/collection_management/",
        }
    }

    /// Mint a fresh temporary URI
    pub fn temp_uri(&self) -> String {
        format!("{}import_{}", self.import_namespace(), Uuid::new_v4())
    }

    /// Whether `uri` is a temporary URI minted for this type
    pub fn is_temp_uri(&self, uri: &str) -> bool {
        uri.strip_prefix(self.import_namespace())
            .is_some_and(|rest| rest.starts_with("import_"))
    }

    /// Path segment of repository-scoped record URIs, where one exists
    pub fn collection_path(&self) -> Option<&'static str> {
        match self {
            ModelType::Accession => Some("accessions"),
            ModelType::Resource => Some("resources"),
            ModelType::Classification => Some("classifications"),
            ModelType::ClassificationTerm => Some("classification_terms"),
            ModelType::Event => Some("events"),
            ModelType::CollectionManagement => Some("collection_management"),
            _ => None,
        }
    }

    /// Records of this type live under `/repositories/{id}/`
    pub fn is_repository_scoped(&self) -> bool {
        self.collection_path().is_some()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference object `{ref: <uri>}`, optionally carrying a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(rename = "ref")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Reference {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            role: None,
            extra: Map::new(),
        }
    }

    pub fn with_role(target: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::new(target)
        }
    }
}

/// Accession or resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchivalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, with = "optional_component", skip_serializing_if = "Option::is_none")]
    pub id_0: Option<String>,
    #[serde(default, with = "optional_component", skip_serializing_if = "Option::is_none")]
    pub id_1: Option<String>,
    #[serde(default, with = "optional_component", skip_serializing_if = "Option::is_none")]
    pub id_2: Option<String>,
    #[serde(default, with = "optional_component", skip_serializing_if = "Option::is_none")]
    pub id_3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_agents: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifications: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_resources: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_accessions: Vec<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ArchivalRecord {
    pub fn identifier(&self) -> IdentifierTuple {
        IdentifierTuple::new([
            self.id_0.clone(),
            self.id_1.clone(),
            self.id_2.clone(),
            self.id_3.clone(),
        ])
    }

    pub fn references_mut(&mut self, field: ReferenceField) -> &mut Vec<Reference> {
        match field {
            ReferenceField::LinkedAgents => &mut self.linked_agents,
            ReferenceField::Subjects => &mut self.subjects,
            ReferenceField::Classifications => &mut self.classifications,
            ReferenceField::RelatedResources => &mut self.related_resources,
            ReferenceField::RelatedAccessions => &mut self.related_accessions,
        }
    }
}

/// Person or corporate entity agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub names: Vec<AgentName>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentName {
    pub primary_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub term: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationTerm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Reference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Records the client never inspects beyond their uri
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpaqueRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record payload of any supported model type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "jsonmodel_type", rename_all = "snake_case")]
pub enum Record {
    Accession(ArchivalRecord),
    Resource(ArchivalRecord),
    AgentPerson(Agent),
    AgentCorporateEntity(Agent),
    Subject(Subject),
    Classification(Classification),
    ClassificationTerm(ClassificationTerm),
    Event(OpaqueRecord),
    CollectionManagement(OpaqueRecord),
}

impl Record {
    pub fn model_type(&self) -> ModelType {
        match self {
            Record::Accession(_) => ModelType::Accession,
            Record::Resource(_) => ModelType::Resource,
            Record::AgentPerson(_) => ModelType::AgentPerson,
            Record::AgentCorporateEntity(_) => ModelType::AgentCorporateEntity,
            Record::Subject(_) => ModelType::Subject,
            Record::Classification(_) => ModelType::Classification,
            Record::ClassificationTerm(_) => ModelType::ClassificationTerm,
            Record::Event(_) => ModelType::Event,
            Record::CollectionManagement(_) => ModelType::CollectionManagement,
        }
    }

    fn uri_slot(&mut self) -> &mut Option<String> {
        match self {
            Record::Accession(r) | Record::Resource(r) => &mut r.uri,
            Record::AgentPerson(a) | Record::AgentCorporateEntity(a) => &mut a.uri,
            Record::Subject(s) => &mut s.uri,
            Record::Classification(c) => &mut c.uri,
            Record::ClassificationTerm(t) => &mut t.uri,
            Record::Event(o) | Record::CollectionManagement(o) => &mut o.uri,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            Record::Accession(r) | Record::Resource(r) => r.uri.as_deref(),
            Record::AgentPerson(a) | Record::AgentCorporateEntity(a) => a.uri.as_deref(),
            Record::Subject(s) => s.uri.as_deref(),
            Record::Classification(c) => c.uri.as_deref(),
            Record::ClassificationTerm(t) => t.uri.as_deref(),
            Record::Event(o) | Record::CollectionManagement(o) => o.uri.as_deref(),
        }
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) {
        *self.uri_slot() = Some(uri.into());
    }

    /// Replace the uri with a freshly minted temporary one and return it
    pub fn assign_temp_uri(&mut self) -> String {
        let uri = self.model_type().temp_uri();
        self.set_uri(uri.clone());
        uri
    }

    /// The field find-or-create deduplicates on
    ///
    /// Agents: first name's primary name. Subjects: first term.
    /// Classifications and terms: identifier.
    pub fn match_key(&self) -> Option<&str> {
        let key = match self {
            Record::AgentPerson(a) | Record::AgentCorporateEntity(a) => {
                a.names.first().map(|n| n.primary_name.as_str())
            }
            Record::Subject(s) => s.terms.first().map(|t| t.term.as_str()),
            Record::Classification(c) => Some(c.identifier.as_str()),
            Record::ClassificationTerm(t) => Some(t.identifier.as_str()),
            _ => None,
        };
        key.filter(|k| !k.is_empty())
    }

    pub fn as_archival(&self) -> Option<&ArchivalRecord> {
        match self {
            Record::Accession(r) | Record::Resource(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_archival_mut(&mut self) -> Option<&mut ArchivalRecord> {
        match self {
            Record::Accession(r) | Record::Resource(r) => Some(r),
            _ => None,
        }
    }

    /// Business identifier of accessions and resources
    pub fn identifier(&self) -> Option<IdentifierTuple> {
        self.as_archival().map(ArchivalRecord::identifier)
    }
}

/// Reference collections the linker can merge into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceField {
    LinkedAgents,
    Subjects,
    Classifications,
    RelatedResources,
    RelatedAccessions,
}

impl ReferenceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceField::LinkedAgents => "linked_agents",
            ReferenceField::Subjects => "subjects",
            ReferenceField::Classifications => "classifications",
            ReferenceField::RelatedResources => "related_resources",
            ReferenceField::RelatedAccessions => "related_accessions",
        }
    }

    /// Where a resolved entity of `model` gets linked on an archival record
    pub fn for_entity(model: ModelType) -> Option<Self> {
        match model {
            ModelType::AgentPerson | ModelType::AgentCorporateEntity => Some(ReferenceField::LinkedAgents),
            ModelType::Subject => Some(ReferenceField::Subjects),
            ModelType::Classification | ModelType::ClassificationTerm => {
                Some(ReferenceField::Classifications)
            }
            ModelType::Resource => Some(ReferenceField::RelatedResources),
            ModelType::Accession => Some(ReferenceField::RelatedAccessions),
            _ => None,
        }
    }
}

mod optional_component {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        super::lenient_component::deserialize(deserializer)
    }
}

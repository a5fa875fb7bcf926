//! Data models for ingestion payloads

pub mod identifier;
pub mod record;

pub use identifier::IdentifierTuple;
pub use record::{
    Agent, AgentName, ArchivalRecord, Classification, ClassificationTerm, ModelType, OpaqueRecord,
    Record, Reference, ReferenceField, Subject, Term,
};

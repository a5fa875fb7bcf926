//! Ingestion passes
//!
//! Each pass drives an [`IngestClient`](crate::client::IngestClient) through
//! queue/run cycles and returns the final outcome summary:
//! - **ead**: convert a directory of EAD documents, record the id mapping
//! - **batches**: upload pre-built record batches
//! - **linking**: find-or-create entities and link them onto archival records
//! - **classifications**: build and upload a classification tree
//! - **merge** (in `batches`): layer catalogue data onto converted resources

pub mod batches;
pub mod classifications;
pub mod ead;
pub mod linking;

pub use batches::{ingest_batches, load_batches, merge_batches};
pub use classifications::{build_classification_tree, ingest_classifications, ClassificationRow};
pub use ead::ingest_ead_directory;
pub use linking::{link_entities, load_link_requests, LinkRequest};

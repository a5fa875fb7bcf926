//! Record lookup and linking against the mock backend

mod helpers;

use aspace_ingest::client::linker::{LinkShape, RecordLookup};
use aspace_ingest::models::{IdentifierTuple, ModelType, Record, ReferenceField};
use aspace_ingest::workflow::{link_entities, LinkRequest};
use helpers::{MockBackend, TestEnv};
use serde_json::json;

fn tuple(parts: &[Option<&str>]) -> IdentifierTuple {
    IdentifierTuple::new(parts.iter().copied())
}

fn seed_accessions(backend: &MockBackend) {
    for (uri, id_0, id_1, id_2) in [
        ("/repositories/2/accessions/17", "1999", "001", None),
        ("/repositories/2/accessions/18", "1999", "002", None),
        ("/repositories/2/accessions/19", "1999", "001", Some("A")),
        ("/repositories/3/accessions/5", "1999", "001", None),
    ] {
        backend.seed(json!({
            "jsonmodel_type": "accession",
            "uri": uri,
            "id_0": id_0,
            "id_1": id_1,
            "id_2": id_2,
            "title": format!("Accession {}", uri),
            "lock_version": 0
        }));
    }
}

/// ["1999","001",nil] finds the ["1999","001"] record, not "-002" or "-001-A"
#[tokio::test]
async fn test_identifier_lookup_exact_tuple() {
    let env = TestEnv::start().await;
    seed_accessions(&env.backend);

    let lookup = RecordLookup::ByIdentifier {
        tuple: tuple(&[Some("1999"), Some("001"), None]),
        repo_id: Some(2),
    };
    let record = env
        .client
        .resolve_record(ModelType::Accession, &lookup)
        .await
        .unwrap()
        .expect("accession found");

    assert_eq!(record.uri(), Some("/repositories/2/accessions/17"));
    let search = &env.backend.requests_to("GET", "/search")[0];
    assert_eq!(search.param("q"), Some("\"1999-001\""));
    assert_eq!(search.param("type[]"), Some("accession"));
}

#[tokio::test]
async fn test_identifier_lookup_scoped_to_repository() {
    let env = TestEnv::start().await;
    seed_accessions(&env.backend);

    let lookup = RecordLookup::ByIdentifier {
        tuple: tuple(&[Some("1999"), Some("001")]),
        repo_id: Some(3),
    };
    let record = env
        .client
        .resolve_record(ModelType::Accession, &lookup)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(record.uri(), Some("/repositories/3/accessions/5"));
}

#[tokio::test]
async fn test_identifier_lookup_without_match() {
    let env = TestEnv::start().await;
    seed_accessions(&env.backend);

    let lookup = RecordLookup::ByIdentifier {
        tuple: tuple(&[Some("2001"), Some("001")]),
        repo_id: Some(2),
    };
    assert!(env
        .client
        .resolve_record(ModelType::Accession, &lookup)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_lookup_by_id() {
    let env = TestEnv::start().await;
    env.backend.seed(json!({
        "jsonmodel_type": "resource",
        "uri": "/repositories/2/resources/812",
        "title": "Papers",
        "lock_version": 4
    }));

    let found = env
        .client
        .resolve_record(ModelType::Resource, &RecordLookup::ById { repo_id: 2, id: 812 })
        .await
        .unwrap();
    let missing = env
        .client
        .resolve_record(ModelType::Resource, &RecordLookup::ById { repo_id: 2, id: 813 })
        .await
        .unwrap();

    assert_eq!(found.unwrap().uri(), Some("/repositories/2/resources/812"));
    assert!(missing.is_none());
    assert_eq!(env.client.summary().total, 0, "lookups are not units of work");
}

/// Linking the same reference twice leaves one entry on the record
#[tokio::test]
async fn test_link_is_idempotent() {
    let env = TestEnv::start().await;
    seed_accessions(&env.backend);
    let lookup = RecordLookup::ById { repo_id: 2, id: 17 };
    let refs = vec!["/agents/people/4".to_string()];
    let shape = LinkShape::Role("source".to_string());

    for expected_added in [1, 0] {
        let record = env
            .client
            .resolve_record(ModelType::Accession, &lookup)
            .await
            .unwrap()
            .unwrap();
        let added = env
            .client
            .queue_link(record, &refs, ReferenceField::LinkedAgents, &shape)
            .await
            .unwrap();
        assert_eq!(added, expected_added);
        env.client.run().await;
    }

    let stored = env.backend.record("/repositories/2/accessions/17").unwrap();
    assert_eq!(
        stored["linked_agents"],
        json!([{"ref": "/agents/people/4", "role": "source"}])
    );
    let summary = env.client.summary();
    assert_eq!((summary.total, summary.successes), (2, 2));
}

#[tokio::test]
async fn test_link_onto_non_archival_record_rejected() {
    let env = TestEnv::start().await;
    let subject: Record = serde_json::from_value(json!({
        "jsonmodel_type": "subject",
        "uri": "/subjects/1",
        "terms": [{"term": "Quilts"}]
    }))
    .unwrap();

    let result = env
        .client
        .queue_link(subject, &["/agents/people/1".to_string()], ReferenceField::LinkedAgents, &LinkShape::Plain)
        .await;
    assert!(result.is_err());
}

/// Resolve entities, then link them onto their accessions
#[tokio::test]
async fn test_two_phase_link_pass() {
    let env = TestEnv::start().await;
    seed_accessions(&env.backend);
    env.backend.seed(json!({
        "jsonmodel_type": "subject",
        "uri": "/subjects/12",
        "terms": [{"term": "Quilts"}]
    }));

    let requests: Vec<LinkRequest> = serde_json::from_value(json!([
        {
            "entity": {"jsonmodel_type": "agent_person", "names": [{"primary_name": "Jane Doe"}]},
            "target": ["1999", "001"],
            "role": "source"
        },
        {
            "entity": {"jsonmodel_type": "subject", "terms": [{"term": "Quilts"}]},
            "target": ["1999", "001"]
        },
        {
            "entity": {"jsonmodel_type": "agent_person", "names": [{"primary_name": "Jane Doe"}]},
            "target": ["1999", "002"],
            "role": "source"
        }
    ]))
    .unwrap();

    let summary = link_entities(&env.client, 2, requests).await.unwrap();

    // One create plus three updates
    assert_eq!((summary.total, summary.successes, summary.failures), (4, 4, 0));
    assert_eq!(env.backend.batch_imports().len(), 1);

    let first = env.backend.record("/repositories/2/accessions/17").unwrap();
    let agent_uri = first["linked_agents"][0]["ref"].as_str().unwrap().to_string();
    assert!(agent_uri.starts_with("/agents/people/"));
    assert_eq!(first["linked_agents"][0]["role"], json!("source"));
    assert_eq!(first["subjects"], json!([{"ref": "/subjects/12"}]));

    let second = env.backend.record("/repositories/2/accessions/18").unwrap();
    assert_eq!(second["linked_agents"], json!([{"ref": agent_uri, "role": "source"}]));

    let untouched = env.backend.record("/repositories/3/accessions/5").unwrap();
    assert!(untouched.get("linked_agents").is_none());
}

/// A target type that cannot be looked up skips its group; the rest still link
#[tokio::test]
async fn test_link_pass_skips_unsupported_target_type() {
    let env = TestEnv::start().await;
    seed_accessions(&env.backend);
    env.backend.seed(json!({
        "jsonmodel_type": "subject",
        "uri": "/subjects/12",
        "terms": [{"term": "Quilts"}]
    }));

    let requests: Vec<LinkRequest> = serde_json::from_value(json!([
        {
            "entity": {"jsonmodel_type": "subject", "terms": [{"term": "Quilts"}]},
            "target": ["1999", "001"],
            "target_type": "subject"
        },
        {
            "entity": {"jsonmodel_type": "subject", "terms": [{"term": "Quilts"}]},
            "target": ["1999", "002"]
        }
    ]))
    .unwrap();

    let summary = link_entities(&env.client, 2, requests).await.unwrap();

    assert_eq!((summary.total, summary.successes, summary.failures), (1, 1, 0));
    let linked = env.backend.record("/repositories/2/accessions/18").unwrap();
    assert_eq!(linked["subjects"], json!([{"ref": "/subjects/12"}]));
    let skipped = env.backend.record("/repositories/2/accessions/17").unwrap();
    assert!(skipped.get("subjects").is_none());
}

//! # Scenario Tests
//!
//! A chat goes in, the Weaver enriches it, and a converged query finds it.

#![allow(clippy::panic)]

use loom::ml::mock::KeywordMl;
use loom::primitives::{EDGE_MENTIONS, EDGE_SIMILAR};
use loom::{
    Chat, ConvergedQuery, Direction, Loom, LoomConfig, Message, Node, NodeId, SchedulerConfig,
    StructuralFilter, WeaverConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(10);

fn model() -> KeywordMl {
    KeywordMl::with_dimension(1024)
        .with_entity("Alice", "person")
        .with_entity("Bob", "person")
        .with_entity("Paris", "location")
}

fn idle_host_config() -> LoomConfig {
    LoomConfig {
        weaver: WeaverConfig {
            scheduler: SchedulerConfig {
                sleep_after_ms: 0,
                poll_interval_ms: 10,
                ..SchedulerConfig::default()
            },
            ..WeaverConfig::default()
        },
        ..LoomConfig::default()
    }
}

#[test]
fn alice_met_bob_in_paris() {
    let temp = tempdir().expect("temp dir");
    let ml = model();
    let db = Loom::open_with(temp.path().join("loom.redb"), idle_host_config(), Arc::new(ml.clone()))
        .expect("open");

    db.insert_node(Node::from(Chat::new("c1", "Weekend plans"))).expect("chat");
    for (id, text) in [
        ("m1", "Alice met Bob in Paris"),
        ("m2", "Quarterly budget review numbers"),
        ("m3", "Lentil soup recipe needs cumin"),
    ] {
        db.insert_node(Node::from(Message::new(id, "c1", "carol", text))).expect("message");
    }
    assert!(db.wait_for_enrichment(ENRICHMENT_TIMEOUT).expect("wait"));

    // m1 carries an embedding
    let m1 = db.get_node(&NodeId::from("m1")).expect("get").expect("m1 exists");
    assert!(m1.embedding_id().is_some());

    // An entity labelled Paris exists
    let entities = db
        .query(&ConvergedQuery::new().filter(StructuralFilter::equals("label", "Paris")))
        .expect("entity lookup");
    assert_eq!(entities.len(), 1);
    let paris = match &entities[0].node {
        Node::Entity(entity) => {
            assert_eq!(entity.entity_type, "location");
            entity.id.clone()
        }
        other => panic!("expected entity, got {other:?}"),
    };

    // m1 -[MENTIONS]-> Paris
    let mentions = db
        .store()
        .edges_of(&NodeId::from("m1"), Direction::Outbound, Some(EDGE_MENTIONS))
        .expect("edges");
    assert!(mentions.iter().any(|e| e.to_node == paris), "{mentions:?}");

    // Paris-related content ranks first within the chat
    let query = ConvergedQuery::new()
        .filter(StructuralFilter::equals("chat_id", "c1"))
        .semantic(ml.embed_now("Paris trip").expect("embed"), None);
    let hits = db.query(&query).expect("query");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].node.id().as_str(), "m1");
    let scores: Vec<f32> = hits.iter().map(|h| h.similarity_score.expect("score")).collect();
    assert!(scores[0] > scores[1], "{scores:?}");

    assert!(db.shutdown().expect("shutdown"));
}

#[test]
fn enrichment_survives_reopen() {
    let temp = tempdir().expect("temp dir");
    let path = temp.path().join("loom.redb");
    {
        let db = Loom::open_with(&path, idle_host_config(), Arc::new(model())).expect("open");
        db.insert_node(Node::from(Chat::new("c1", "Weekend plans"))).expect("chat");
        db.insert_node(Node::from(Message::new("m1", "c1", "carol", "Alice met Bob in Paris")))
            .expect("m1");
        db.insert_node(Node::from(Message::new(
            "m2",
            "c1",
            "carol",
            "Alice met Bob in Paris yesterday",
        )))
        .expect("m2");
        assert!(db.wait_for_enrichment(ENRICHMENT_TIMEOUT).expect("wait"));
        assert!(db.shutdown().expect("shutdown"));
    }

    let db = Loom::open(&path).expect("reopen");
    let m2 = db.get_node(&NodeId::from("m2")).expect("get").expect("m2 exists");
    let embedding = m2.embedding_id().cloned().expect("embedded before reopen");
    let stored = db.store().get_embedding(&embedding).expect("get").expect("embedding stored");

    // The reloaded vector index answers from the persisted graph.
    let query = ConvergedQuery::new().semantic(stored.vector, Some(0.99));
    let hits = db.query(&query).expect("query");
    assert_eq!(hits.first().map(|h| h.node.id().as_str()), Some("m2"));

    let similar = db
        .store()
        .edges_of(&NodeId::from("m1"), Direction::Both, Some(EDGE_SIMILAR))
        .expect("edges");
    assert_eq!(similar.len(), 1);
    assert!(db.check_consistency().expect("check").is_consistent());
}

//! # Enrichment Tests
//!
//! The Weaver running against a real store and the keyword model.

#![allow(clippy::panic)]

use async_trait::async_trait;
use loom_core::primitives::{EDGE_MENTIONS, EDGE_SIMILAR, EDGE_SUMMARIZES};
use loom_core::{
    Chat, Direction, FieldValue, FilterOperator, IndexedField, Message, Node, NodeId, Store,
    StoreConfig,
};
use loom_weaver::ml::mock::KeywordMl;
use loom_weaver::weaver::modules::entity_linker::entity_id_for;
use loom_weaver::weaver::modules::semantic_indexer::embedding_id_for;
use loom_weaver::{
    ActivityLevel, ActivityMonitor, ExtractedEntity, MlCapability, SchedulerConfig, Task,
    TaskKind, Weaver, WeaverConfig, WeaverError, channel,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

const SETTLE: Duration = Duration::from_secs(10);

fn keyword_ml() -> KeywordMl {
    KeywordMl::new()
        .with_entity("Alice", "person")
        .with_entity("Bob", "person")
        .with_entity("Paris", "location")
}

/// Idle host: every priority is admitted at once.
fn config() -> WeaverConfig {
    WeaverConfig {
        summary_threshold: 1000,
        scheduler: SchedulerConfig {
            sleep_after_ms: 0,
            poll_interval_ms: 10,
            ..SchedulerConfig::default()
        },
        ..WeaverConfig::default()
    }
}

struct Harness {
    weaver: Weaver,
    store: Arc<Store>,
    _temp: TempDir,
}

impl Harness {
    fn start(config: WeaverConfig, ml: Arc<dyn MlCapability>) -> Self {
        let temp = tempdir().expect("temp dir");
        let (sender, receiver) = channel(config.queue_capacity);
        let store = Arc::new(
            Store::open_with(temp.path().join("weaver.redb"), StoreConfig::default(), Arc::new(sender))
                .expect("open"),
        );
        let activity = Arc::new(ActivityMonitor::new(config.scheduler.clone()));
        let weaver = Weaver::start(Arc::clone(&store), ml, receiver, activity, config).expect("start");
        Self {
            weaver,
            store,
            _temp: temp,
        }
    }

    fn settle(&self) {
        assert!(
            self.weaver.wait_idle(SETTLE),
            "weaver did not go idle: {:?}",
            self.weaver.stats()
        );
    }

    fn message(&self, id: &str, chat: &str, text: &str) {
        self.store
            .insert_node(Node::from(Message::new(id, chat, "alice", text)))
            .expect("insert message");
    }

    fn node(&self, id: &str) -> Node {
        self.store
            .get_node(&NodeId::from(id))
            .expect("get")
            .unwrap_or_else(|| panic!("{id} missing"))
    }

    fn outbound(&self, id: &str, edge_type: &str) -> Vec<loom_core::Edge> {
        self.store
            .edges_of(&NodeId::from(id), Direction::Outbound, Some(edge_type))
            .expect("edges")
    }

    fn nodes_of_type(&self, node_type: &str) -> Vec<Node> {
        let snapshot = self.store.snapshot().expect("snapshot");
        let ids = snapshot
            .lookup(IndexedField::NodeType, FilterOperator::Equals, &FieldValue::from(node_type))
            .expect("lookup");
        ids.iter()
            .map(|id| snapshot.get_node(id).expect("get").expect("indexed node exists"))
            .collect()
    }
}

fn with_chat(config: WeaverConfig, ml: Arc<dyn MlCapability>) -> Harness {
    let harness = Harness::start(config, ml);
    harness
        .store
        .insert_node(Node::from(Chat::new("c1", "Trip planning")))
        .expect("insert chat");
    harness
}

#[test]
fn messages_are_embedded_once() {
    let harness = with_chat(config(), Arc::new(keyword_ml()));
    harness.message("m1", "c1", "Alice met Bob in Paris");
    harness.settle();

    let node = harness.node("m1");
    assert_eq!(node.embedding_id(), Some(&embedding_id_for(&NodeId::from("m1"))));
    let embedding = harness
        .store
        .get_embedding(&embedding_id_for(&NodeId::from("m1")))
        .expect("get")
        .expect("embedding stored");
    assert_eq!(embedding.dimension(), 384);

    let before = harness.store.snapshot().expect("snapshot").embedding_count().expect("count");

    // Redelivery of the same work writes nothing new.
    assert!(harness.weaver.submit(Task::new(TaskKind::SemanticIndex, NodeId::from("m1"))));
    harness.settle();

    let after = harness.store.snapshot().expect("snapshot").embedding_count().expect("count");
    assert_eq!(before, after);
    let vectors = harness.store.vector_stats().expect("stats");
    assert_eq!(vectors.live as u64, after);
    assert_eq!(vectors.tombstones, 0);
    assert!(harness.store.check_consistency().expect("check").is_consistent());
}

#[test]
fn mentions_resolve_to_one_entity_per_name() {
    let harness = with_chat(config(), Arc::new(keyword_ml()));
    harness.message("m1", "c1", "Alice met Bob in Paris");
    harness.message("m2", "c1", "Back from Paris at last");
    harness.settle();

    let paris = entity_id_for("Paris", "location");
    match harness.node(paris.as_str()) {
        Node::Entity(entity) => {
            assert_eq!(entity.label, "Paris");
            assert_eq!(entity.entity_type, "location");
        }
        other => panic!("expected entity, got {other:?}"),
    }

    let m1 = harness.outbound("m1", EDGE_MENTIONS);
    assert_eq!(m1.len(), 3);
    let to_paris = m1.iter().find(|e| e.to_node == paris).expect("m1 mentions Paris");
    assert_eq!(to_paris.metadata.get("span_start").and_then(|v| v.as_u64()), Some(17));
    assert_eq!(to_paris.metadata.get("span_end").and_then(|v| v.as_u64()), Some(22));

    // Both messages resolve to the same node.
    let m2 = harness.outbound("m2", EDGE_MENTIONS);
    assert_eq!(m2.len(), 1);
    assert_eq!(m2[0].to_node, paris);
    let locations = harness
        .nodes_of_type("entity")
        .into_iter()
        .filter(|n| matches!(n, Node::Entity(e) if e.entity_type == "location"))
        .count();
    assert_eq!(locations, 1);
}

/// Tags every mention of Paris three times, with differently cased types.
struct CaseVariantNer(KeywordMl);

#[async_trait]
impl MlCapability for CaseVariantNer {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, WeaverError> {
        self.0.embed(text).await
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, WeaverError> {
        let Some(start) = text.find("Paris") else {
            return Ok(Vec::new());
        };
        Ok(["LOCATION", "Location", "location"]
            .into_iter()
            .map(|entity_type| ExtractedEntity {
                text: "Paris".to_string(),
                entity_type: entity_type.to_string(),
                span: start..start + 5,
            })
            .collect())
    }

    async fn summarize(&self, texts: &[String]) -> Result<String, WeaverError> {
        self.0.summarize(texts).await
    }

    fn model_name(&self) -> &str {
        "case-variant"
    }
}

#[test]
fn case_variant_types_never_overwrite_entities() {
    let harness = with_chat(config(), Arc::new(CaseVariantNer(keyword_ml())));
    harness.message("m1", "c1", "Landed in Paris");
    harness.settle();

    let mentions = harness.outbound("m1", EDGE_MENTIONS);
    assert_eq!(mentions.len(), 3, "{mentions:?}");
    let mut types: Vec<String> = mentions
        .iter()
        .map(|edge| match harness.node(edge.to_node.as_str()) {
            Node::Entity(entity) => {
                assert_eq!(entity.label, "Paris");
                entity.entity_type
            }
            other => panic!("expected entity, got {other:?}"),
        })
        .collect();
    types.sort();
    assert_eq!(types, vec!["LOCATION", "Location", "location"]);
    assert_eq!(harness.nodes_of_type("entity").len(), 3);

    // A second message resolves to the same three entities.
    harness.message("m2", "c1", "Paris again");
    harness.settle();
    let mut first: Vec<NodeId> = mentions.into_iter().map(|e| e.to_node).collect();
    let mut second: Vec<NodeId> = harness
        .outbound("m2", EDGE_MENTIONS)
        .into_iter()
        .map(|e| e.to_node)
        .collect();
    first.sort();
    second.sort();
    assert_eq!(first, second);
    assert_eq!(harness.nodes_of_type("entity").len(), 3);
    assert!(harness.store.check_consistency().expect("check").is_consistent());
}

#[test]
fn near_duplicates_are_associated() {
    let harness = with_chat(config(), Arc::new(keyword_ml()));
    harness.message("m1", "c1", "Alice met Bob in Paris");
    harness.message("m2", "c1", "Alice met Bob in Paris yesterday");
    harness.message("m3", "c1", "Quarterly budget review numbers");
    harness.settle();

    let linked: Vec<loom_core::Edge> = harness
        .store
        .edges_of(&NodeId::from("m1"), Direction::Both, Some(EDGE_SIMILAR))
        .expect("edges");
    assert_eq!(linked.len(), 1, "{linked:?}");
    let edge = &linked[0];
    assert_eq!(edge.other_end(&NodeId::from("m1")), Some(&NodeId::from("m2")));
    let score = edge
        .metadata
        .get("similarity_score")
        .and_then(|v| v.as_f64())
        .expect("score recorded");
    assert!(score >= 0.85, "score {score}");

    let unrelated = harness
        .store
        .edges_of(&NodeId::from("m3"), Direction::Both, Some(EDGE_SIMILAR))
        .expect("edges");
    assert!(unrelated.is_empty());
}

#[test]
fn chat_tails_are_summarized_in_runs() {
    let config = WeaverConfig {
        summary_threshold: 3,
        ..config()
    };
    let harness = with_chat(config, Arc::new(keyword_ml()));
    let texts = [
        "Booking flights tonight",
        "Hotel near the river",
        "Museum tickets bought",
        "Dinner reservation confirmed",
        "Train back on Sunday",
        "Packing list drafted",
    ];
    let insert = |range: std::ops::Range<usize>| {
        for i in range {
            let message = Message::new(format!("m{}", i + 1), "c1", "alice", texts[i])
                .with_timestamp(i as i64 + 1);
            harness.store.insert_node(Node::from(message)).expect("insert");
        }
    };

    insert(0..3);
    harness.settle();
    let summaries = harness.nodes_of_type("summary");
    assert_eq!(summaries.len(), 1);
    let Node::Summary(first) = &summaries[0] else {
        panic!("expected summary");
    };
    let ids = |list: &[NodeId]| list.iter().map(NodeId::as_str).map(str::to_owned).collect::<Vec<_>>();
    assert_eq!(ids(&first.message_ids), vec!["m1", "m2", "m3"]);
    assert!(first.content.starts_with("3 messages"));
    assert_eq!(harness.outbound(first.id.as_str(), EDGE_SUMMARIZES).len(), 3);

    // Two new messages stay below the threshold.
    insert(3..5);
    harness.settle();
    assert_eq!(harness.nodes_of_type("summary").len(), 1);

    insert(5..6);
    harness.settle();
    let summaries = harness.nodes_of_type("summary");
    assert_eq!(summaries.len(), 2);
    let second = summaries
        .iter()
        .find_map(|n| match n {
            Node::Summary(s) if s.id != first.id => Some(s),
            _ => None,
        })
        .expect("second summary");
    assert_eq!(ids(&second.message_ids), vec!["m4", "m5", "m6"]);
}

/// Embedding always fails; everything else behaves.
struct BrokenEmbedder(KeywordMl);

#[async_trait]
impl MlCapability for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, WeaverError> {
        Err(WeaverError::Ml("model offline".to_string()))
    }

    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, WeaverError> {
        self.0.extract_entities(text).await
    }

    async fn summarize(&self, texts: &[String]) -> Result<String, WeaverError> {
        self.0.summarize(texts).await
    }

    fn model_name(&self) -> &str {
        "broken"
    }
}

#[test]
fn failed_tasks_are_counted_and_dropped() {
    let harness = with_chat(config(), Arc::new(BrokenEmbedder(keyword_ml())));
    harness.message("m1", "c1", "Alice met Bob in Paris");
    harness.settle();

    let stats = harness.weaver.stats();
    assert!(stats.tasks_failed >= 1, "{stats:?}");
    assert!(stats.tasks_completed >= 1, "{stats:?}");
    assert_eq!(harness.node("m1").embedding_id(), None);

    // Entity linking does not depend on embeddings.
    assert_eq!(harness.outbound("m1", EDGE_MENTIONS).len(), 3);
}

#[test]
fn low_priority_work_waits_for_quiet_host() {
    let harness = with_chat(config(), Arc::new(keyword_ml()));
    harness.weaver.activity().set_override(Some(ActivityLevel::High));
    harness.message("m1", "c1", "Alice met Bob in Paris");

    assert!(!harness.weaver.wait_idle(Duration::from_millis(200)));
    assert!(harness.weaver.stats().queued.total() > 0);
    assert_eq!(harness.node("m1").embedding_id(), None);

    harness.weaver.activity().set_override(None);
    harness.settle();
    assert!(harness.node("m1").embedding_id().is_some());
}

#[test]
fn backfill_recovers_dropped_events() {
    let temp = tempdir().expect("temp dir");
    let config = WeaverConfig {
        queue_capacity: 1,
        ..config()
    };
    let (sender, receiver) = channel(config.queue_capacity);
    let store = Arc::new(
        Store::open_with(temp.path().join("weaver.redb"), StoreConfig::default(), Arc::new(sender))
            .expect("open"),
    );

    // Nothing drains the channel yet, so only the first event fits.
    store.insert_node(Node::from(Chat::new("c1", "Trip planning"))).expect("chat");
    for (id, text) in [("m1", "Alice met Bob in Paris"), ("m2", "Dinner with Bob")] {
        store.insert_node(Node::from(Message::new(id, "c1", "alice", text))).expect("message");
    }

    let activity = Arc::new(ActivityMonitor::new(config.scheduler.clone()));
    let mut weaver = Weaver::start(Arc::clone(&store), Arc::new(keyword_ml()), receiver, activity, config)
        .expect("start");
    assert!(weaver.wait_idle(SETTLE));
    assert!(weaver.stats().events_dropped >= 4);
    let embedded = |id: &str| {
        store
            .get_node(&NodeId::from(id))
            .expect("get")
            .and_then(|n| n.embedding_id().cloned())
            .is_some()
    };
    assert!(!embedded("m1"));

    assert!(weaver.backfill().expect("backfill") > 0);
    assert!(weaver.wait_idle(SETTLE));
    assert!(embedded("m1"));
    assert!(embedded("m2"));
    assert_eq!(
        store
            .edges_of(&NodeId::from("m1"), Direction::Outbound, Some(EDGE_MENTIONS))
            .expect("edges")
            .len(),
        3
    );
    assert!(weaver.shutdown(SETTLE));
}

#[test]
fn shutdown_abandons_queued_work() {
    let mut harness = with_chat(config(), Arc::new(keyword_ml()));
    harness.weaver.activity().set_override(Some(ActivityLevel::High));
    harness.message("m1", "c1", "Alice met Bob in Paris");

    assert!(harness.weaver.shutdown(SETTLE));
    assert_eq!(harness.weaver.stats().pending, 0);
    assert!(!harness.weaver.submit(Task::new(TaskKind::SemanticIndex, NodeId::from("m1"))));
    assert!(matches!(harness.weaver.backfill(), Err(WeaverError::ShuttingDown)));
    assert!(harness.weaver.shutdown(SETTLE));

    // Writes keep working without enrichment.
    harness.message("m2", "c1", "Still writable");
    assert!(harness.store.get_node(&NodeId::from("m2")).expect("get").is_some());
}

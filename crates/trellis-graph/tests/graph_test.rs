//! Behaviour of the graph over the in-memory and SQLite backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::TryStreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use trellis_config::RetryConfig;
use trellis_graph::{
  ActionDeclaration, ActionId, ActionKey, ArtifactId, ArtifactKind, ConsumerKey, ConsumerMarker,
  Graph, GraphError, InputKey, KeyCodec, Relation, Schema,
};
use trellis_kv::{Database, InMemoryKvStore, KeyRange, SqliteKvStore};

fn graph_on(store: Arc<InMemoryKvStore>, root: &str) -> Graph {
  Graph::new(Database::new(store), Schema::new(root))
}

fn graph() -> Graph {
  graph_on(Arc::new(InMemoryKvStore::new()), "test")
}

#[tokio::test]
async fn test_scenario_a_output_has_producer_and_no_consumers() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let save = graph
    .create_action("Save", "echo hello > $OUT", &cancel)
    .await
    .unwrap();
  let out = save
    .add_output("OUT", "Save", ArtifactKind::File, &cancel)
    .await
    .unwrap();

  let actions: Vec<_> = graph.list_actions(&cancel).try_collect().await.unwrap();
  let artifacts: Vec<_> = graph.list_artifacts(&cancel).try_collect().await.unwrap();
  assert_eq!(actions.len(), 1);
  assert_eq!(artifacts.len(), 1);
  assert_eq!(artifacts[0].kind(), ArtifactKind::File);

  let producer = out.producer(&cancel).await.unwrap();
  assert_eq!(producer.id(), save.id());
  assert_eq!(producer.label(), "Save");
  assert_eq!(producer.command(), "echo hello > $OUT");

  assert!(out.consumers(&cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_b_input_registers_consumer() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let save = graph.create_action("Save", "echo", &cancel).await.unwrap();
  let out = save
    .add_output("OUT", "Save", ArtifactKind::File, &cancel)
    .await
    .unwrap();

  let greet = graph
    .create_action("Greet", "cat $GREETING", &cancel)
    .await
    .unwrap();
  let artifact = graph.artifact(out.id(), &cancel).await.unwrap();
  greet.add_input("GREETING", &artifact, &cancel).await.unwrap();

  let consumers = out.consumers(&cancel).await.unwrap();
  assert_eq!(consumers, vec![greet.clone()]);

  let inputs = greet.inputs(&cancel).await.unwrap();
  assert_eq!(inputs.len(), 1);
  assert_eq!(inputs["GREETING"], out);

  let outputs = save.outputs(&cancel).await.unwrap();
  assert_eq!(outputs["OUT"], out);
  assert!(greet.outputs(&cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_scenario_c_unknown_ids_are_not_found() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let err = graph.artifact(ArtifactId::new(), &cancel).await.unwrap_err();
  assert!(matches!(err, GraphError::ArtifactNotFound(_)));
  assert!(err.is_not_found());

  let err = graph.action(ActionId::new(), &cancel).await.unwrap_err();
  assert!(matches!(err, GraphError::ActionNotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scenario_d_disjoint_outputs_commit_without_conflict() {
  let store = Arc::new(InMemoryKvStore::new());
  // One attempt only, so any conflict would surface as an error.
  let db = Database::new(store).with_retry(RetryConfig {
    max_attempts: 1,
    ..RetryConfig::default()
  });
  let graph = Graph::new(db, Schema::new("test"));
  let cancel = CancellationToken::new();

  let first = graph.create_action("First", "a", &cancel).await.unwrap();
  let second = graph.create_action("Second", "b", &cancel).await.unwrap();

  for _ in 0..20 {
    let (a, b) = tokio::join!(
      first.add_output("OUT", "First", ArtifactKind::File, &cancel),
      second.add_output("OUT", "Second", ArtifactKind::Directory, &cancel),
    );
    a.unwrap();
    b.unwrap();
  }

  let artifacts: Vec<_> = graph.list_artifacts(&cancel).try_collect().await.unwrap();
  assert_eq!(artifacts.len(), 40);
}

#[tokio::test]
async fn test_every_output_has_exactly_its_producer() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let mut expected = BTreeMap::new();
  for label in ["a", "b", "c"] {
    let action = graph.create_action(label, "run", &cancel).await.unwrap();
    for name in ["x", "y"] {
      let artifact = action
        .add_output(name, label, ArtifactKind::File, &cancel)
        .await
        .unwrap();
      expected.insert(artifact.id(), action.id());
    }
  }

  let artifacts: Vec<_> = graph.list_artifacts(&cancel).try_collect().await.unwrap();
  assert_eq!(artifacts.len(), expected.len());
  for artifact in artifacts {
    let producer = artifact.producer(&cancel).await.unwrap();
    assert_eq!(expected[&artifact.id()], producer.id());
  }
}

#[tokio::test]
async fn test_standalone_artifact_has_no_producer() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let artifact = graph
    .create_artifact("source", ArtifactKind::Directory, &cancel)
    .await
    .unwrap();
  let err = artifact.producer(&cancel).await.unwrap_err();
  assert!(matches!(err, GraphError::NoProducer(id) if id == artifact.id()));
  assert!(err.is_not_found());
}

#[tokio::test]
async fn test_add_input_twice_renames_without_duplicate_consumer() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let source = graph
    .create_artifact("src", ArtifactKind::File, &cancel)
    .await
    .unwrap();
  let action = graph.create_action("Build", "make", &cancel).await.unwrap();

  action.add_input("FIRST", &source, &cancel).await.unwrap();
  action.add_input("SECOND", &source, &cancel).await.unwrap();

  let inputs = action.inputs(&cancel).await.unwrap();
  assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["SECOND"]);

  let consumers = source.consumers(&cancel).await.unwrap();
  assert_eq!(consumers.len(), 1);

  let consumer_range = graph
    .schema()
    .subspace(Relation::Consumer)
    .range()
    .unwrap();
  let rows = graph
    .database()
    .read_transact(&cancel, |tx| {
      let range = consumer_range.clone();
      async move { tx.get_range(&range, None).await }
    })
    .await
    .unwrap();
  assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_add_input_requires_both_entities() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let action = graph.create_action("Build", "make", &cancel).await.unwrap();
  let err = graph
    .add_input(action.id(), "IN", ArtifactId::new(), &cancel)
    .await
    .unwrap_err();
  assert!(matches!(err, GraphError::ArtifactNotFound(_)));

  let artifact = graph
    .create_artifact("src", ArtifactKind::File, &cancel)
    .await
    .unwrap();
  let err = graph
    .add_input(ActionId::new(), "IN", artifact.id(), &cancel)
    .await
    .unwrap_err();
  assert!(matches!(err, GraphError::ActionNotFound(_)));

  assert!(artifact.consumers(&cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_output_requires_action() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let err = graph
    .add_output(ActionId::new(), "OUT", "orphan", ArtifactKind::File, &cancel)
    .await
    .unwrap_err();
  assert!(matches!(err, GraphError::ActionNotFound(_)));

  let artifacts: Vec<_> = graph.list_artifacts(&cancel).try_collect().await.unwrap();
  assert!(artifacts.is_empty());
}

#[tokio::test]
async fn test_listing_is_in_creation_order_across_pages() {
  let graph = graph().with_page_size(2);
  let cancel = CancellationToken::new();

  let mut created = Vec::new();
  for i in 0..7 {
    let action = graph
      .create_action(&format!("step-{i}"), "true", &cancel)
      .await
      .unwrap();
    created.push(action.id());
  }

  let listed: Vec<ActionId> = graph
    .list_actions(&cancel)
    .map_ok(|action| action.id())
    .try_collect()
    .await
    .unwrap();
  assert_eq!(listed, created);
}

#[tokio::test]
async fn test_consumers_in_creation_order() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let source = graph
    .create_artifact("src", ArtifactKind::File, &cancel)
    .await
    .unwrap();

  let mut created = Vec::new();
  for label in ["one", "two", "three"] {
    let action = graph.create_action(label, "cat", &cancel).await.unwrap();
    created.push(action.id());
  }
  // Wire in reverse; resolution order follows consumer creation.
  for id in created.iter().rev() {
    graph.add_input(*id, "IN", source.id(), &cancel).await.unwrap();
  }

  let consumers: Vec<ActionId> = source
    .consumers(&cancel)
    .await
    .unwrap()
    .iter()
    .map(|a| a.id())
    .collect();
  assert_eq!(consumers, created);
}

#[tokio::test]
async fn test_declare_action_is_atomic() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let source = graph
    .create_artifact("src", ArtifactKind::File, &cancel)
    .await
    .unwrap();

  let declaration = ActionDeclaration {
    label: "Compile".to_string(),
    command: "cc".to_string(),
    inputs: BTreeMap::from([("SRC".to_string(), source.id())]),
    outputs: BTreeMap::from([
      ("BIN".to_string(), ArtifactKind::File),
      ("OBJ".to_string(), ArtifactKind::Directory),
    ]),
  };
  let declared = graph.declare_action(&declaration, &cancel).await.unwrap();
  assert_eq!(declared.outputs.len(), 2);
  assert_eq!(declared.outputs["BIN"].label(), "Compile");
  assert_eq!(
    declared.action.inputs(&cancel).await.unwrap()["SRC"].id(),
    source.id()
  );

  let broken = ActionDeclaration {
    label: "Broken".to_string(),
    command: "false".to_string(),
    inputs: BTreeMap::from([("MISSING".to_string(), ArtifactId::new())]),
    outputs: BTreeMap::from([("OUT".to_string(), ArtifactKind::File)]),
  };
  let err = graph.declare_action(&broken, &cancel).await.unwrap_err();
  assert!(matches!(err, GraphError::ArtifactNotFound(_)));

  let actions: Vec<_> = graph.list_actions(&cancel).try_collect().await.unwrap();
  assert_eq!(actions.len(), 1);
  let artifacts: Vec<_> = graph.list_artifacts(&cancel).try_collect().await.unwrap();
  assert_eq!(artifacts.len(), 3);
}

#[tokio::test]
async fn test_dangling_consumer_edge_is_surfaced() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let artifact = graph
    .create_artifact("src", ArtifactKind::File, &cancel)
    .await
    .unwrap();
  let ghost = ActionId::new();
  let key = ConsumerKey {
    artifact: artifact.id(),
    action: ghost,
  }
  .encode(graph.schema());

  graph
    .database()
    .transact(&cancel, |tx| {
      let key = key.clone();
      async move { tx.set(&key, &ConsumerMarker.encode()) }
    })
    .await
    .unwrap();

  let err = artifact.consumers(&cancel).await.unwrap_err();
  match err {
    GraphError::DanglingEdge { relation, id } => {
      assert_eq!(relation, Relation::Consumer);
      assert_eq!(id, ghost.as_uuid());
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn test_dangling_input_edge_is_surfaced() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let action = graph.create_action("Build", "make", &cancel).await.unwrap();
  let key = InputKey {
    action: action.id(),
    artifact: ArtifactId::new(),
  }
  .encode(graph.schema());

  graph
    .database()
    .transact(&cancel, |tx| {
      let key = key.clone();
      async move { tx.set(&key, &[0, 0, 0, 0, 0, 0, 0, 0]) }
    })
    .await
    .unwrap();

  let err = action.inputs(&cancel).await.unwrap_err();
  assert!(matches!(
    err,
    GraphError::DanglingEdge {
      relation: Relation::Input,
      ..
    }
  ));
}

#[tokio::test]
async fn test_corrupt_record_is_a_decode_error() {
  let graph = graph();
  let cancel = CancellationToken::new();

  let id = ActionId::new();
  let key = ActionKey { id }.encode(graph.schema());
  graph
    .database()
    .transact(&cancel, |tx| {
      let key = key.clone();
      async move { tx.set(&key, &[0xde, 0xad]) }
    })
    .await
    .unwrap();

  let err = graph.action(id, &cancel).await.unwrap_err();
  assert!(matches!(err, GraphError::Decode(_)));
}

#[tokio::test]
async fn test_schemas_are_isolated_and_wipe_is_scoped() {
  let store = Arc::new(InMemoryKvStore::new());
  let left = graph_on(store.clone(), "left");
  let right = graph_on(store.clone(), "right");
  let cancel = CancellationToken::new();

  left.create_action("L", "l", &cancel).await.unwrap();
  let r = right.create_action("R", "r", &cancel).await.unwrap();

  let lefts: Vec<_> = left.list_actions(&cancel).try_collect().await.unwrap();
  assert_eq!(lefts.len(), 1);
  assert_eq!(lefts[0].label(), "L");

  // Keys written outside any schema survive a wipe too.
  left
    .database()
    .transact(&cancel, |tx| async move { tx.set(b"unrelated", b"1") })
    .await
    .unwrap();

  left.wipe(&cancel).await.unwrap();

  let lefts: Vec<_> = left.list_actions(&cancel).try_collect().await.unwrap();
  assert!(lefts.is_empty());
  assert_eq!(right.action(r.id(), &cancel).await.unwrap().label(), "R");

  let unrelated = left
    .database()
    .read_transact(&cancel, |tx| async move { tx.get(b"unrelated").await })
    .await
    .unwrap();
  assert!(unrelated.is_some());
}

#[tokio::test]
async fn test_cancelled_operation_reports_cancellation() {
  let graph = graph();
  let cancel = CancellationToken::new();
  cancel.cancel();

  let err = graph.create_action("X", "x", &cancel).await.unwrap_err();
  assert!(matches!(err, GraphError::Cancelled));

  let err = graph
    .list_actions(&cancel)
    .try_collect::<Vec<_>>()
    .await
    .unwrap_err();
  assert!(matches!(err, GraphError::Cancelled));
}

#[tokio::test]
async fn test_scenarios_on_sqlite() {
  let dir = TempDir::new().unwrap();
  let store = SqliteKvStore::connect(dir.path().join("graph.db"))
    .await
    .unwrap();
  let graph = Graph::new(
    Database::new(Arc::new(store)).with_retry(RetryConfig {
      initial_delay_ms: 1,
      ..RetryConfig::default()
    }),
    Schema::default(),
  );
  let cancel = CancellationToken::new();

  let save = graph.create_action("Save", "echo", &cancel).await.unwrap();
  let out = save
    .add_output("OUT", "Save", ArtifactKind::File, &cancel)
    .await
    .unwrap();
  let greet = graph.create_action("Greet", "cat", &cancel).await.unwrap();
  greet.add_input("GREETING", &out, &cancel).await.unwrap();

  assert_eq!(out.producer(&cancel).await.unwrap().id(), save.id());
  assert_eq!(out.consumers(&cancel).await.unwrap(), vec![greet.clone()]);
  assert_eq!(greet.inputs(&cancel).await.unwrap()["GREETING"], out);

  let labels: Vec<String> = graph
    .list_actions(&cancel)
    .map_ok(|a| a.label().to_string())
    .try_collect()
    .await
    .unwrap();
  assert_eq!(labels, vec!["Save".to_string(), "Greet".to_string()]);

  graph.wipe(&cancel).await.unwrap();
  let remaining = graph
    .database()
    .read_transact(&cancel, |tx| async move {
      tx.get_range(&KeyRange::all(), None).await
    })
    .await
    .unwrap();
  assert!(remaining.is_empty());
}

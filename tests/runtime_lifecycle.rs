// tests/runtime_lifecycle.rs

//! Runtime admission, submission paths, cancellation, events and
//! config-driven graph building.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use common::RecordingListener;
use pipedag::{Error, Event, PipelineConfig, Runtime, Status};

const SIMPLE_CONFIG: &str = r#"
Param:
  test-param: "test-value"
Graph: |
  stateDiagram-v2
  [*] --> Task1
  Task1 --> Task2
  Task2 --> [*]
Nodes:
  Task1:
    Image: "test-image:latest"
  Task2:
    Image: "test-image:latest"
"#;

#[tokio::test]
async fn run_sync_completes_and_clears_the_registry() {
    let runtime = Runtime::new();
    let listener = RecordingListener::new();

    let pipeline = runtime
        .run_sync("sync-pipeline", SIMPLE_CONFIG, Some(listener.clone()))
        .await
        .unwrap();

    assert_eq!(pipeline.status(), Status::Success);
    assert!(pipeline.is_done());

    // The sync path removes the pipeline before returning.
    let err = runtime.get("sync-pipeline").unwrap_err();
    assert!(matches!(err, Error::PipelineNotFound(_)));
}

#[tokio::test]
async fn duplicate_ids_are_rejected_across_both_paths() {
    let runtime = Runtime::new();

    runtime
        .run_sync("duplicate-id", SIMPLE_CONFIG, None)
        .await
        .unwrap();

    let err = runtime
        .run_sync("duplicate-id", SIMPLE_CONFIG, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePipeline(_)));

    let err = runtime
        .run_async("duplicate-id", SIMPLE_CONFIG, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePipeline(_)));
}

#[tokio::test]
async fn failed_parse_does_not_burn_the_id() {
    let runtime = Runtime::new();
    let invalid = "invalid: yaml: content\n  missing: closing: brace\n";

    let err = runtime.run_sync("retry-id", invalid, None).await.unwrap_err();
    assert!(matches!(err, Error::YamlError(_)));

    // The id is still admissible with a valid config.
    runtime.run_sync("retry-id", SIMPLE_CONFIG, None).await.unwrap();
}

#[tokio::test]
async fn run_async_registers_and_completes() {
    let runtime = Runtime::new();

    let pipeline = runtime
        .run_async("async-pipeline", SIMPLE_CONFIG, None)
        .await
        .unwrap();

    // Either still registered or already finished and removed; the handle
    // itself always resolves.
    timeout(Duration::from_secs(5), pipeline.done())
        .await
        .expect("pipeline should finish");
    assert_eq!(pipeline.status(), Status::Success);
}

#[tokio::test]
async fn cancel_reaches_a_running_pipeline() {
    let config = r#"
Executors:
  shell:
    type: local
Graph: |
  [*] --> slow
Nodes:
  slow:
    executor: shell
    steps:
      - name: wait
        run: sleep 10
"#;

    let runtime = Runtime::new();
    let listener = RecordingListener::new();

    let pipeline = runtime
        .run_async("cancel-me", config, Some(listener.clone()))
        .await
        .unwrap();

    // Let the run reach the sleeping step.
    tokio::time::sleep(Duration::from_millis(300)).await;

    runtime.cancel("cancel-me").unwrap();

    timeout(Duration::from_secs(2), pipeline.done())
        .await
        .expect("cancelled pipeline should finish promptly");

    assert_eq!(pipeline.status(), Status::Cancelled);
    assert!(listener.count(Event::PipelineCancelled) >= 1);
}

#[tokio::test]
async fn cancel_unknown_pipeline_fails() {
    let runtime = Runtime::new();
    let err = runtime.cancel("nope").unwrap_err();
    assert!(matches!(err, Error::PipelineNotFound(_)));
}

#[tokio::test]
async fn event_ordering_holds() {
    let runtime = Runtime::new();
    let listener = RecordingListener::new();

    runtime
        .run_sync("events", SIMPLE_CONFIG, Some(listener.clone()))
        .await
        .unwrap();

    assert_eq!(listener.count(Event::PipelineStart), 1);
    assert_eq!(listener.count(Event::PipelineFinish), 1);
    assert_eq!(listener.count(Event::PipelineNodeStart), 2);
    assert_eq!(listener.count(Event::PipelineNodeFinish), 2);

    let start = listener.first_index(Event::PipelineStart).unwrap();
    let finish = listener.last_index(Event::PipelineFinish).unwrap();
    let first_node = listener.first_index(Event::PipelineNodeStart).unwrap();
    let last_node = listener.last_index(Event::PipelineNodeFinish).unwrap();

    assert!(start < first_node);
    assert!(last_node < finish);
}

#[tokio::test]
async fn conditional_edges_flow_from_config_params() {
    let config = r#"
Param:
  env: prod
Graph: |
  stateDiagram-v2
  [*] --> a
  a --> b
  b --> c : to prod [{{ env == 'prod' }}]
  b --> d : to dev [{{ env == 'dev' }}]
Nodes:
  a: {}
  b: {}
  c: {}
  d: {}
"#;

    let runtime = Runtime::new();
    let pipeline = runtime.run_sync("fan-out", config, None).await.unwrap();

    let nodes = pipeline.graph().unwrap().nodes();
    assert_eq!(nodes["a"].status(), Status::Success);
    assert_eq!(nodes["b"].status(), Status::Success);
    assert_eq!(nodes["c"].status(), Status::Success);
    // The dev branch is never visited.
    assert_eq!(nodes["d"].status(), Status::Unknown);
}

#[tokio::test]
async fn status_seeding_gates_downstream_nodes() {
    let config = r#"
Graph: |
  [*] --> a
  a --> b
  b --> c : on success [{{ nodeStatus == 'SUCCESS' }}]
Status:
  b: FAILED
Nodes:
  a: {}
  b: {}
  c: {}
"#;

    let runtime = Runtime::new();
    let pipeline = runtime.run_sync("gated", config, None).await.unwrap();

    let nodes = pipeline.graph().unwrap().nodes();
    // The seeded FAILED status survives the simulated run and blocks c.
    assert_eq!(nodes["b"].status(), Status::Failed);
    assert_eq!(nodes["c"].status(), Status::Unknown);
}

#[tokio::test]
async fn invalid_edge_expression_fails_the_run() {
    let config = r#"
Graph: |
  [*] --> a
  a --> b : broken [{{ unclosed]
Nodes:
  a: {}
  b: {}
"#;

    let runtime = Runtime::new();
    let err = runtime.run_sync("broken-expr", config, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidExpression { .. }));
}

#[test]
fn build_graph_creates_vertices_and_edges() {
    let runtime = Runtime::new();
    let config = PipelineConfig::from_yaml(
        r#"
Graph: |
  stateDiagram-v2
  direction LR
  [*] --> Merge
  Merge --> Build
  Build --> Deploy
  Deploy --> [*]
Nodes:
  Merge: {}
  Build: {}
  Deploy: {}
"#,
    )
    .unwrap();

    let graph = runtime.build_graph(&config);
    assert_eq!(graph.nodes().len(), 3);
    assert_eq!(graph.edges().len(), 2);
    assert!(graph.edges().contains_key("Merge->Build"));
    assert!(graph.edges().contains_key("Build->Deploy"));
}

#[test]
fn build_graph_skips_unknown_endpoints_and_junk() {
    let runtime = Runtime::new();
    let config = PipelineConfig::from_yaml(
        r#"
Graph: |
  [*] --> A
  A --> B
  B --> C
  C --> [*]
Nodes:
  A: {}
  C: {}
"#,
    )
    .unwrap();

    // B is undefined: both of its transitions are dropped, the rest of
    // the build proceeds.
    let graph = runtime.build_graph(&config);
    assert_eq!(graph.nodes().len(), 2);
    assert!(graph.edges().is_empty());

    let config = PipelineConfig::from_yaml(
        "Graph: \"complete nonsense\"\nNodes:\n  A: {}\n",
    )
    .unwrap();
    let graph = runtime.build_graph(&config);
    assert_eq!(graph.nodes().len(), 1);
    assert!(graph.edges().is_empty());
}

#[test]
fn build_graph_records_conditional_expressions() {
    let runtime = Runtime::new();
    let config = PipelineConfig::from_yaml(
        r#"
Graph: |
  [*] --> A
  A --> B : gate [{{ ok == 'yes' }}]
  A --> C : plain label
Nodes:
  A: {}
  B: {}
  C: {}
"#,
    )
    .unwrap();

    let graph = runtime.build_graph(&config);
    let edges = graph.edges();
    assert_eq!(edges["A->B"].expression(), "{{ ok == 'yes' }}");
    assert_eq!(edges["A->C"].expression(), "");
}

#[tokio::test]
async fn in_config_metadata_reaches_context_and_store() {
    let config = r#"
Metadate:
  type: in-config
  data:
    team: platform
Graph: |
  [*] --> only
Nodes:
  only: {}
"#;

    let runtime = Runtime::new();
    let pipeline = runtime.run_sync("with-meta", config, None).await.unwrap();

    assert_eq!(pipeline.metadata().get("team").map(String::as_str), Some("platform"));

    let store = pipeline.metadata_store().expect("store attached");
    assert_eq!(store.get("team").await.unwrap(), "platform");
    assert!(matches!(
        store.set("team", "other").await.unwrap_err(),
        Error::ReadOnlyMetadata
    ));
}

#[tokio::test]
async fn unsupported_metadata_type_fails_admission_without_burning_the_id() {
    let config = r#"
Metadate:
  type: etcd
Nodes:
  only: {}
"#;

    let runtime = Runtime::new();
    let err = runtime.run_sync("bad-meta", config, None).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedMetadataType(_)));

    runtime.run_sync("bad-meta", SIMPLE_CONFIG, None).await.unwrap();
}

#[tokio::test]
async fn stop_background_closes_done_and_cancels_ctx() {
    let runtime = Runtime::with_reap_interval(Duration::from_millis(50));
    runtime.start_background();

    assert!(!runtime.is_done());
    runtime.stop_background();
    // Idempotent.
    runtime.stop_background();

    timeout(Duration::from_millis(500), runtime.done())
        .await
        .expect("done should close after stop");
    assert!(runtime.ctx().is_cancelled());
}

#[tokio::test]
async fn notify_accepts_arbitrary_payloads() {
    let runtime = Runtime::new();
    runtime.notify(&json!("plain message")).unwrap();
    runtime
        .notify(&json!({"message": "from a map", "kind": "info"}))
        .unwrap();
    runtime.notify(&json!(123)).unwrap();
}

#[tokio::test]
async fn concurrent_async_submissions_with_distinct_ids_all_run() {
    let runtime = Runtime::new();

    let mut pipelines = Vec::new();
    for i in 0..10 {
        let id = format!("pipeline-{i}");
        let pipeline = runtime.run_async(&id, SIMPLE_CONFIG, None).await.unwrap();
        pipelines.push(pipeline);
    }

    for pipeline in pipelines {
        timeout(Duration::from_secs(5), pipeline.done())
            .await
            .expect("pipeline should finish");
        assert_eq!(pipeline.status(), Status::Success);
    }
}

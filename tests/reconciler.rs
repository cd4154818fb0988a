// tests/reconciler.rs

use std::sync::Arc;

use rundag::controller::Reconciler;
use rundag::errors::RundagError;
use rundag::model::{ConditionStatus, ConditionType, ObjectKey, ResourceKind};
use rundag::scheduler::{DEFAULT_FINALIZER, SchedulingContext};
use rundag::state::RunPhase;
use rundag_test_utils::{FakeCluster, RunBuilder, graph_from_edges, init_tracing};

fn setup() -> (Arc<FakeCluster>, Reconciler<FakeCluster>, ObjectKey) {
    init_tracing();
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_graph(graph_from_edges("g", &[("a", &[]), ("b", &["a"])]));
    let key = cluster.insert_run(RunBuilder::new("r", "g").build());
    let reconciler = Reconciler::new(Arc::clone(&cluster), SchedulingContext::default());
    (cluster, reconciler, key)
}

#[tokio::test]
async fn first_reconcile_initializes_the_run() {
    let (cluster, reconciler, key) = setup();

    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert!(outcome.requeue);
    assert_eq!(outcome.phase, Some(RunPhase::Initializing));

    let run = cluster.run(&key).unwrap();
    assert!(run.metadata.has_finalizer(DEFAULT_FINALIZER));
    assert!(run.metadata.is_owned_by(ResourceKind::DefinitionGraph, "g"));
    assert!(run.status.jobs.is_empty());
    assert_eq!(run.status.conditions.len(), 1);
    let cond = &run.status.conditions[0];
    assert_eq!(cond.type_, ConditionType::Initializing);
    assert_eq!(cond.status, ConditionStatus::Unknown);
    assert_eq!(cond.reason, "Initializing");

    assert!(
        cluster.created_units().is_empty(),
        "no unit may exist before the finalizer is in place"
    );
}

#[tokio::test]
async fn second_reconcile_starts_root_steps() {
    let (cluster, reconciler, key) = setup();
    reconciler.reconcile(&key).await.unwrap();

    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome.phase, Some(RunPhase::InProgress));
    assert_eq!(cluster.created_units(), vec!["r-a"]);

    let run = cluster.run(&key).unwrap();
    let last = run.status.last_condition().unwrap();
    assert_eq!(last.type_, ConditionType::InProgress);
    assert_eq!(last.status, ConditionStatus::True);
    assert_eq!(last.reason, "JobStart");
    assert_eq!(last.message, "Created r-a");
}

#[tokio::test]
async fn missing_run_is_treated_as_deleted() {
    let (cluster, reconciler, _key) = setup();

    let outcome = reconciler
        .reconcile(&ObjectKey::new("default", "ghost"))
        .await
        .unwrap();
    assert!(!outcome.requeue);
    assert_eq!(outcome.phase, None);
    assert!(cluster.create_attempts().is_empty());
}

#[tokio::test]
async fn missing_graph_stops_quietly_without_touching_the_run() {
    let (cluster, reconciler, key) = setup();
    cluster.remove_graph(&ObjectKey::new("default", "g"));
    let before = cluster.run(&key).unwrap();

    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert!(!outcome.requeue);
    assert_eq!(outcome.phase, None);
    assert_eq!(cluster.run(&key).unwrap(), before);
    assert_eq!(cluster.status_updates(), 0);
}

#[tokio::test]
async fn deletion_removes_finalizer_and_lets_the_run_go() {
    let (cluster, reconciler, key) = setup();
    reconciler.reconcile(&key).await.unwrap();
    reconciler.reconcile(&key).await.unwrap();

    cluster.request_deletion(&key);
    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome.phase, None);
    assert!(cluster.run(&key).is_none(), "run is gone once its finalizer is removed");

    // A further reconcile sees nothing.
    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome.phase, None);
}

#[tokio::test]
async fn deletion_of_a_terminal_run_still_finalizes() {
    let (cluster, reconciler, key) = setup();
    reconciler.reconcile(&key).await.unwrap();
    reconciler.reconcile(&key).await.unwrap();
    cluster.fail_unit("r-a");
    assert_eq!(
        reconciler.reconcile(&key).await.unwrap().phase,
        Some(RunPhase::Failed)
    );

    cluster.request_deletion(&key);
    reconciler.reconcile(&key).await.unwrap();
    assert!(cluster.run(&key).is_none());
}

#[tokio::test]
async fn fetch_outage_is_retryable() {
    let (cluster, reconciler, key) = setup();
    cluster.set_fetch_outage(true);

    let err = reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, RundagError::TransientFetch(_)));
    assert!(err.is_retryable());

    cluster.set_fetch_outage(false);
    assert!(reconciler.reconcile(&key).await.is_ok());
}

#[tokio::test]
async fn conflicting_status_write_surfaces_and_retry_converges() {
    let (cluster, reconciler, key) = setup();
    cluster.inject_conflicts(1);

    let err = reconciler.reconcile(&key).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert_eq!(cluster.run(&key).unwrap().status.phase(), RunPhase::Unseen);

    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome.phase, Some(RunPhase::Initializing));

    let run = cluster.run(&key).unwrap();
    assert_eq!(
        run.metadata
            .finalizers
            .iter()
            .filter(|f| *f == DEFAULT_FINALIZER)
            .count(),
        1
    );
    assert_eq!(run.status.conditions.len(), 1);
}

#[test]
fn only_errors_no_retry_can_fix_are_permanent() {
    let unit = ObjectKey::new("default", "r-a");
    let vanished = RundagError::StepCreation {
        step: "a".to_string(),
        source: Box::new(RundagError::NotFound {
            kind: ResourceKind::ExecutionUnit,
            key: unit.clone(),
        }),
    };
    assert!(vanished.is_retryable());

    let taken = RundagError::StepCreation {
        step: "a".to_string(),
        source: Box::new(RundagError::AlreadyExists {
            kind: ResourceKind::ExecutionUnit,
            key: unit,
        }),
    };
    assert!(!taken.is_retryable());

    assert!(RundagError::TransientWrite("down".to_string()).is_retryable());
    assert!(!RundagError::InvalidDefinition("bad".to_string()).is_retryable());
    assert!(!RundagError::Config("bad".to_string()).is_retryable());
}

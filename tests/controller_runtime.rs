// tests/controller_runtime.rs

use std::sync::Arc;
use std::time::Duration;

use rundag::controller::{
    ControllerEvent, ControllerOptions, ControllerRuntime, Reconciler, WorkQueue,
};
use rundag::model::ObjectKey;
use rundag::scheduler::SchedulingContext;
use rundag::state::RunPhase;
use rundag_test_utils::{FakeCluster, RunBuilder, graph_from_edges, init_tracing, with_timeout};
use tokio::sync::mpsc;

fn once_options() -> ControllerOptions {
    ControllerOptions {
        exit_when_done: true,
        resync_interval: Duration::from_millis(50),
        requeue_delay: Duration::from_millis(10),
    }
}

fn runtime_for(
    cluster: &Arc<FakeCluster>,
    options: ControllerOptions,
) -> (ControllerRuntime<FakeCluster>, mpsc::Sender<ControllerEvent>) {
    let (tx, rx) = mpsc::channel(64);
    let reconciler = Reconciler::new(Arc::clone(cluster), SchedulingContext::default());
    (ControllerRuntime::new(reconciler, tx.clone(), rx, options), tx)
}

#[test]
fn work_queue_collapses_duplicate_keys() {
    let mut queue = WorkQueue::new();
    let a = ObjectKey::new("default", "a");
    let b = ObjectKey::new("default", "b");

    assert!(queue.push(a.clone()));
    assert!(queue.push(b.clone()));
    assert!(!queue.push(a.clone()));
    assert_eq!(queue.len(), 2);

    assert_eq!(queue.pop(), Some(a.clone()));
    assert_eq!(queue.len(), 1);
    // Once popped, the key may be queued again.
    assert!(queue.push(a.clone()));
    assert_eq!(queue.pop(), Some(b));
    assert_eq!(queue.pop(), Some(a));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn runtime_drives_run_to_success_on_unit_events() {
    init_tracing();
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_graph(graph_from_edges(
        "g",
        &[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])],
    ));
    let key = cluster.insert_run(RunBuilder::new("r", "g").build());

    let (mut runtime, tx) = runtime_for(&cluster, once_options());
    runtime.track(key.clone());
    let handle = tokio::spawn(runtime.run());

    // Play the platform: finish whatever is running and report it.
    let driver = {
        let cluster = Arc::clone(&cluster);
        let key = key.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cluster.succeed_all_units();
                if tx
                    .send(ControllerEvent::UnitChanged { owner: key.clone() })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        })
    };

    let phases = with_timeout(handle).await.unwrap().unwrap();
    driver.abort();

    assert_eq!(phases.get(&key), Some(&RunPhase::Succeeded));
    let mut created = cluster.created_units();
    created.sort();
    assert_eq!(created, vec!["r-a", "r-b", "r-c", "r-d"]);
}

#[tokio::test]
async fn runtime_retries_transient_errors_after_delay() {
    init_tracing();
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_graph(graph_from_edges("g", &[("a", &[])]));
    let key = cluster.insert_run(RunBuilder::new("r", "g").build());
    cluster.set_fetch_outage(true);

    let (mut runtime, tx) = runtime_for(&cluster, once_options());
    runtime.track(key.clone());
    let handle = tokio::spawn(runtime.run());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cluster.created_units().is_empty());
    cluster.set_fetch_outage(false);

    // Wait for the delayed retry to initialize and start the run.
    with_timeout(async {
        while cluster.created_units().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    cluster.succeed_all_units();
    tx.send(ControllerEvent::UnitChanged { owner: key.clone() })
        .await
        .unwrap();

    let phases = with_timeout(handle).await.unwrap().unwrap();
    assert_eq!(phases.get(&key), Some(&RunPhase::Succeeded));
}

#[tokio::test]
async fn runtime_exits_when_run_cannot_progress() {
    init_tracing();
    let cluster = Arc::new(FakeCluster::new());
    let key = cluster.insert_run(RunBuilder::new("orphan", "missing").build());

    let (mut runtime, _tx) = runtime_for(&cluster, once_options());
    runtime.track(key.clone());

    let phases = with_timeout(runtime.run()).await.unwrap();
    assert!(phases.is_empty());
    assert!(cluster.create_attempts().is_empty());
}

#[tokio::test]
async fn runtime_drops_a_run_whose_unit_name_is_taken() {
    init_tracing();
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_graph(graph_from_edges("g1", &[("b-c", &[])]));
    cluster.insert_graph(graph_from_edges("g2", &[("c", &[])]));
    let owner = cluster.insert_run(RunBuilder::new("a", "g1").build());
    let clashing = cluster.insert_run(RunBuilder::new("a-b", "g2").build());

    let reconciler = Reconciler::new(Arc::clone(&cluster), SchedulingContext::default());
    reconciler.reconcile(&owner).await.unwrap();
    reconciler.reconcile(&owner).await.unwrap();

    let (mut runtime, _tx) = runtime_for(&cluster, once_options());
    runtime.track(clashing.clone());

    let phases = with_timeout(runtime.run()).await.unwrap();
    assert!(!phases.contains_key(&clashing));
    assert_eq!(cluster.create_attempts(), vec!["a-b-c", "a-b-c"]);
}

#[tokio::test]
async fn shutdown_event_stops_a_long_running_controller() {
    init_tracing();
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert_graph(graph_from_edges("g", &[("a", &[])]));
    let key = cluster.insert_run(RunBuilder::new("r", "g").build());

    let options = ControllerOptions {
        exit_when_done: false,
        ..once_options()
    };
    let (mut runtime, tx) = runtime_for(&cluster, options);
    runtime.track(key.clone());
    let handle = tokio::spawn(runtime.run());

    tx.send(ControllerEvent::ShutdownRequested).await.unwrap();
    let phases = with_timeout(handle).await.unwrap().unwrap();
    assert!(phases.contains_key(&key));
}

#[test]
fn resync_requeues_every_tracked_run() {
    let cluster = Arc::new(FakeCluster::new());
    let (mut runtime, _tx) = runtime_for(&cluster, once_options());

    let a = ObjectKey::new("default", "a");
    let b = ObjectKey::new("default", "b");
    assert!(runtime.handle_event(ControllerEvent::RunChanged(a.clone())));
    assert!(runtime.handle_event(ControllerEvent::UnitChanged { owner: b.clone() }));
    assert!(runtime.handle_event(ControllerEvent::Resync));

    assert_eq!(runtime.phase_of(&a), Some(RunPhase::Unseen));
    assert_eq!(runtime.phase_of(&b), Some(RunPhase::Unseen));
    assert!(!runtime.all_done());
    assert!(!runtime.handle_event(ControllerEvent::ShutdownRequested));
}

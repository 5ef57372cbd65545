// tests/engine_lifecycle.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sandboxer::errors::SandboxError;
use sandboxer::task::{Task, TaskState};
use sandboxer_test_utils::{eventually, init_tracing, with_timeout, FlakyStore, HarnessBuilder};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn start_recovers_stored_tasks() -> TestResult {
    init_tracing();
    let store = Arc::new(FlakyStore::new());
    let mut gone = Task::process("gone", "true");
    gone.status.state = TaskState::Running;
    store.seed(&gone);
    store.seed(&Task::process("alive", "sleep 60"));

    let h = HarnessBuilder::new()
        .admission_limit(5)
        .reconcile_interval(Duration::from_secs(60))
        .store(store)
        .build();
    h.executor.set_state("alive", TaskState::Running);

    h.engine.start(CancellationToken::new()).await?;

    assert_eq!(h.engine.get("alive").await?.status.state, TaskState::Running);
    // No workload behind it any more.
    assert_eq!(h.engine.get("gone").await?.status.state, TaskState::NotFound);
    assert_eq!(
        h.store.record("gone").map(|t| t.status.state),
        Some(TaskState::NotFound)
    );
    assert!(h.executor.started().is_empty(), "recovery never restarts workloads");

    h.engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn recovery_skips_tasks_that_cannot_be_inspected() -> TestResult {
    init_tracing();
    let store = Arc::new(FlakyStore::new());
    store.seed(&Task::process("a", "true"));
    store.seed(&Task::process("b", "true"));

    let h = HarnessBuilder::new().store(store).build();
    h.executor.fail_inspect("a", true);
    h.executor.set_state("b", TaskState::Running);

    h.engine.start(CancellationToken::new()).await?;
    assert!(matches!(
        h.engine.get("a").await,
        Err(SandboxError::TaskNotFound(_))
    ));
    assert!(h.engine.get("b").await.is_ok());
    assert!(h.store.record("a").is_some(), "skipped records stay in the store");

    h.engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn store_listing_failure_aborts_start() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.store.fail_list(true);

    let err = h.engine.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SandboxError::Store(_)));
    assert!(!h.engine.is_running().await);

    h.store.fail_list(false);
    h.engine.start(CancellationToken::new()).await?;
    h.engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn second_start_is_rejected() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.engine.start(CancellationToken::new()).await?;

    let err = h.engine.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, SandboxError::AlreadyStarted));

    h.engine.stop().await;
    assert!(!h.engine.is_running().await);
    // A stopped engine can be started again.
    h.engine.start(CancellationToken::new()).await?;
    h.engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_without_start_is_a_no_op() {
    init_tracing();
    let h = HarnessBuilder::new().build();
    with_timeout(h.engine.stop()).await;
    assert!(!h.engine.is_running().await);
}

#[tokio::test]
async fn background_loop_drives_deletion_to_completion() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new()
        .reconcile_interval(Duration::from_millis(10))
        .build();
    h.engine.start(CancellationToken::new()).await?;

    h.engine.create(Task::process("a", "sleep 60")).await?;
    h.engine.delete("a").await?;

    eventually(async || { h.engine.list().await.is_empty() }).await;
    assert_eq!(h.executor.stop_count("a"), 1);
    assert!(h.store.record("a").is_none());

    h.engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn cancelling_parent_token_ends_the_loop() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new()
        .reconcile_interval(Duration::from_millis(10))
        .build();
    let shutdown = CancellationToken::new();
    h.engine.start(shutdown.clone()).await?;
    assert!(h.engine.is_running().await);

    shutdown.cancel();
    eventually(async || { !h.engine.is_running().await }).await;

    // No ticks after the loop is gone.
    h.engine.create(Task::process("a", "true")).await?;
    h.executor.set_state("a", TaskState::Succeeded);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.engine.get("a").await?.status.state, TaskState::Running);

    h.engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn no_tick_runs_after_stop_returns() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new()
        .reconcile_interval(Duration::from_millis(5))
        .build();
    h.engine.start(CancellationToken::new()).await?;
    h.engine.create(Task::process("a", "true")).await?;

    h.engine.stop().await;
    h.executor.set_state("a", TaskState::Succeeded);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(h.engine.get("a").await?.status.state, TaskState::Running);
    Ok(())
}

// tests/engine_admission.rs

use std::error::Error;
use std::time::SystemTime;

use sandboxer::errors::SandboxError;
use sandboxer::task::{Task, TaskState, TaskStatus};
use sandboxer_test_utils::{init_tracing, with_timeout, HarnessBuilder};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn second_task_waits_until_first_is_deleted() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().admission_limit(1).build();

    let a = h.engine.create(Task::process("a", "sleep 60")).await?;
    assert_eq!(a.status.state, TaskState::Running);

    let err = h.engine.create(Task::process("b", "true")).await.unwrap_err();
    assert!(matches!(
        err,
        SandboxError::AdmissionLimitExceeded {
            limit: 1,
            active: 1
        }
    ));
    assert!(h.store.record("b").is_none(), "rejected task must not be persisted");
    assert_eq!(h.executor.start_count("b"), 0);

    // A deletion-marked task no longer holds its slot, even before it is reaped.
    h.engine.delete("a").await?;
    h.engine.create(Task::process("b", "true")).await?;

    let names: Vec<String> = h.engine.list().await.into_iter().map(|t| t.name).collect();
    assert_eq!(names.len(), 2);
    Ok(())
}

#[tokio::test]
async fn terminal_tasks_free_their_slot() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().admission_limit(1).build();

    h.engine.create(Task::process("a", "true")).await?;
    h.executor.set_state("a", TaskState::Succeeded);
    h.engine.reconcile().await;
    assert_eq!(h.engine.get("a").await?.status.state, TaskState::Succeeded);

    h.engine.create(Task::process("b", "true")).await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_creates_never_exceed_limit() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().admission_limit(3).build();
    let engine = h.engine.clone();

    let mut joins = Vec::new();
    for i in 0..12 {
        let engine = engine.clone();
        joins.push(tokio::spawn(async move {
            engine.create(Task::process(format!("t{i}"), "sleep 1")).await
        }));
    }

    let mut admitted = 0;
    for join in joins {
        match join.await? {
            Ok(_) => admitted += 1,
            Err(SandboxError::AdmissionLimitExceeded { limit, .. }) => assert_eq!(limit, 3),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(h.engine.list().await.len(), 3);
    assert_eq!(h.store.names().len(), 3);
    Ok(())
}

#[tokio::test]
async fn duplicate_name_is_rejected_without_side_effects() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().admission_limit(5).build();

    h.engine.create(Task::process("a", "true")).await?;
    let err = h.engine.create(Task::process("a", "false")).await.unwrap_err();
    assert!(matches!(err, SandboxError::AlreadyExists(ref n) if n == "a"));
    assert_eq!(h.executor.start_count("a"), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_tasks_are_rejected_before_admission() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().admission_limit(5).build();

    for bad in [
        Task::process("", "true"),
        Task::process("Has_Upper", "true"),
        Task::process("ok", ""),
        Task::pod("pod", Vec::<(&str, &str)>::new()),
        Task::pod("pod", [("web", "true"), ("web", "true")]),
    ] {
        let err = h.engine.create(bad).await.unwrap_err();
        assert!(matches!(err, SandboxError::InvalidTask(_)), "got {err}");
    }
    assert!(h.executor.started().is_empty());
    assert!(h.store.names().is_empty());
    Ok(())
}

#[tokio::test]
async fn caller_supplied_status_and_deletion_are_ignored() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();

    let mut task = Task::process("a", "true");
    task.status = TaskStatus::new(TaskState::Succeeded, Vec::new());
    task.deletion_timestamp = Some(SystemTime::now());

    let created = h.engine.create(task).await?;
    assert!(!created.is_deleted());
    assert_eq!(created.status.state, TaskState::Running);
    Ok(())
}

#[tokio::test]
async fn failed_executor_start_rolls_back_the_record() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.executor.fail_start("a");

    let err = h.engine.create(Task::process("a", "true")).await.unwrap_err();
    assert!(matches!(err, SandboxError::Executor(_)));
    assert!(h.store.record("a").is_none());
    assert!(matches!(
        h.engine.get("a").await,
        Err(SandboxError::TaskNotFound(_))
    ));

    // The slot was never taken.
    h.engine.create(Task::process("b", "true")).await?;
    Ok(())
}

#[tokio::test]
async fn store_create_failure_surfaces_as_store_error() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.store.fail_create(true);

    let err = h.engine.create(Task::process("a", "true")).await.unwrap_err();
    assert!(matches!(err, SandboxError::Store(_)));
    assert!(h.executor.started().is_empty());
    assert!(h.engine.list().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn initial_inspect_failure_keeps_pending() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.executor.fail_inspect("a", true);

    let created = h.engine.create(Task::process("a", "true")).await?;
    assert_eq!(created.status.state, TaskState::Pending);
    // Pending still holds the slot.
    assert!(h.engine.create(Task::process("b", "true")).await.is_err());

    h.executor.fail_inspect("a", false);
    h.engine.reconcile().await;
    assert_eq!(h.engine.get("a").await?.status.state, TaskState::Running);
    assert_eq!(
        h.store.record("a").map(|t| t.status.state),
        Some(TaskState::Running)
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_reads_see_the_same_task() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().admission_limit(2).build();
    h.engine.create(Task::process("a", "true")).await?;

    let (got, listed) = with_timeout(async { tokio::join!(h.engine.get("a"), h.engine.list()) }).await;
    assert_eq!(got?.name, "a");
    assert_eq!(listed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unpersisted_initial_status_is_not_returned() -> TestResult {
    init_tracing();
    let h = HarnessBuilder::new().build();
    h.store.fail_update(true);

    let created = h.engine.create(Task::process("a", "true")).await?;
    assert_eq!(created.status.state, TaskState::Pending);
    assert_eq!(h.engine.get("a").await?.status, created.status);
    assert_eq!(
        h.store.record("a").map(|t| t.status.state),
        Some(TaskState::Pending)
    );

    h.store.fail_update(false);
    h.engine.reconcile().await;
    assert_eq!(h.engine.get("a").await?.status.state, TaskState::Running);
    Ok(())
}

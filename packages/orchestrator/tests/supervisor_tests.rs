//! End-to-end supervision tests against real child processes.

use orchestrator_core::models::{RunStatus, WorkerRole};
use orchestrator_core::storage::mock::MockStorage;
use orchestrator_core::supervisor::{await_all, ProcessSupervisor, SupervisorConfig};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn supervisor(
    storage: Arc<MockStorage>,
    hard_timeout: Duration,
) -> ProcessSupervisor<MockStorage> {
    ProcessSupervisor::with_config(
        storage,
        PathBuf::from("/bin/true"),
        Vec::new(),
        SupervisorConfig {
            hard_timeout,
            poll_interval: Duration::from_millis(10),
            tail_chars: 2000,
        },
    )
}

fn shell(script: &str) -> Command {
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(script);
    command
}

#[tokio::test]
async fn clean_exit_finalizes_success_with_output_tail() {
    let storage = Arc::new(MockStorage::new());
    let supervisor = supervisor(Arc::clone(&storage), Duration::from_secs(30));

    let handle = supervisor
        .launch_command(WorkerRole::New, 1, shell("echo starting; echo all done"))
        .await
        .unwrap();
    let results = await_all(vec![handle]).await;

    assert!(matches!(results[0], (1, Ok(RunStatus::Success))));
    let finalized = storage.finalized();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].1, RunStatus::Success);
    assert!(finalized[0].3.contains("all done"));
    assert_eq!(storage.stale_running_deleted(), vec![1]);
}

#[tokio::test]
async fn nonzero_exit_finalizes_failed() {
    let storage = Arc::new(MockStorage::new());
    let supervisor = supervisor(Arc::clone(&storage), Duration::from_secs(30));

    let handle = supervisor
        .launch_command(WorkerRole::Update, 2, shell("exit 3"))
        .await
        .unwrap();
    let results = await_all(vec![handle]).await;

    assert!(matches!(results[0], (2, Ok(RunStatus::Failed))));
}

#[tokio::test]
async fn runaway_worker_is_killed_at_the_timeout() {
    let storage = Arc::new(MockStorage::new());
    let supervisor = supervisor(Arc::clone(&storage), Duration::from_millis(300));

    let started = Instant::now();
    let handle = supervisor
        .launch_command(WorkerRole::Update, 3, shell("sleep 600"))
        .await
        .unwrap();
    let results = await_all(vec![handle]).await;

    assert!(matches!(results[0], (3, Ok(RunStatus::Timeout))));
    // Nowhere near the sleep duration
    assert!(started.elapsed() < Duration::from_secs(10));
    let finalized = storage.finalized();
    assert_eq!(finalized[0].1, RunStatus::Timeout);
}

#[tokio::test]
async fn live_log_reads_by_line_offset() {
    let storage = Arc::new(MockStorage::new());
    let supervisor = supervisor(Arc::clone(&storage), Duration::from_secs(30));
    let registry = supervisor.registry();

    let handle = supervisor
        .launch_command(WorkerRole::New, 4, shell("echo one; echo two; echo three"))
        .await
        .unwrap();
    await_all(vec![handle]).await;

    let first = registry.read_log(4, 0).unwrap();
    assert_eq!(first.lines, vec!["one", "two", "three"]);
    assert_eq!(first.total, 3);
    assert!(!first.is_running);

    // Repeating the read at the reported offset yields nothing new
    let second = registry.read_log(4, first.total).unwrap();
    assert!(second.lines.is_empty());
    assert_eq!(second.total, 3);
}

#[tokio::test]
async fn queued_input_reaches_the_worker() {
    let storage = Arc::new(MockStorage::new());
    let supervisor = supervisor(Arc::clone(&storage), Duration::from_secs(30));
    let registry = supervisor.registry();

    let handle = supervisor
        .launch_command(WorkerRole::New, 5, shell("read line; echo \"got $line\""))
        .await
        .unwrap();
    assert!(registry.push_input(5, "ping\n"));
    let results = await_all(vec![handle]).await;

    assert!(matches!(results[0], (5, Ok(RunStatus::Success))));
    let read = registry.read_log(5, 0).unwrap();
    assert!(read.lines.iter().any(|l| l.contains("got ping")));

    // The input queue died with the worker
    assert!(!registry.push_input(5, "late\n"));
}

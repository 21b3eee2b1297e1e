#![cfg(unix)]

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use sermn::core::{
    spawn_reaper, Handle, StartOutcome, Supervisor, SupervisorError, SupervisorOptions,
    WorkloadId, WorkloadMode, WorkloadRegistry, WorkloadSpec, WorkloadStatus,
};
use sermn::platform;

/// Fake container runtime: `start` echoes the name, `inspect` reports a pid,
/// `stop` fails, `kill` succeeds.
const FAILING_STOP_RUNTIME: &str = r#"
case "$1" in
  start) echo "$2" ;;
  inspect) echo 4242 ;;
  stop) echo "stop refused" >&2; exit 1 ;;
  kill) exit 0 ;;
  *) exit 2 ;;
esac
"#;

/// Fake runtime whose `stop` hangs until it is cut off
const HANGING_STOP_RUNTIME: &str = r#"
case "$1" in
  start) echo "$2" ;;
  inspect) exit 1 ;;
  stop) exec sleep 30 ;;
  kill) exit 0 ;;
  *) exit 2 ;;
esac
"#;

/// Fake runtime whose `start` takes a while
const SLOW_START_RUNTIME: &str = r#"
case "$1" in
  start) sleep 2; echo "$2" ;;
  inspect) exit 1 ;;
  kill) exit 0 ;;
  *) exit 2 ;;
esac
"#;

/// Fake runtime that writes more than a pipe buffer before succeeding
const CHATTY_RUNTIME: &str = r#"
case "$1" in
  start) head -c 200000 /dev/zero | tr '\0' w >&2; echo "$2" ;;
  inspect) head -c 100000 /dev/zero | tr '\0' x >&2; echo 4242 ;;
  stop) head -c 200000 /dev/zero | tr '\0' w; exit 0 ;;
  *) exit 2 ;;
esac
"#;

/// Native workload that ignores SIGTERM
const STUBBORN_SCRIPT: &str = r#"
trap '' TERM
while :; do sleep 1; done
"#;

/// Fake runtime that cannot start anything
const BROKEN_RUNTIME: &str = r#"
echo "no such container" >&2
exit 1
"#;

fn supervisor(specs: Vec<WorkloadSpec>) -> Arc<Supervisor> {
    supervisor_with(specs, SupervisorOptions::default())
}

fn supervisor_with(specs: Vec<WorkloadSpec>, options: SupervisorOptions) -> Arc<Supervisor> {
    Arc::new(Supervisor::new(
        Arc::new(WorkloadRegistry::new(specs)),
        options,
    ))
}

/// Options pointing the container backend at a shell script
fn fake_runtime(dir: &Path, script: &str, timeout: Duration) -> SupervisorOptions {
    let path = dir.join("runtime.sh");
    std::fs::write(&path, script).unwrap();
    SupervisorOptions {
        container_runtime: format!("sh {}", path.display()),
        runtime_timeout: timeout,
        shutdown_grace: Duration::from_secs(2),
    }
}

fn native(target: &str) -> WorkloadSpec {
    WorkloadSpec::new(target, WorkloadMode::Native, target)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    condition()
}

#[test]
fn start_is_idempotent_and_kill_clears_handle() {
    let supervisor = supervisor(vec![native("sleep 30")]);
    let id = WorkloadId(0);

    let pid = match supervisor.start(id).unwrap() {
        StartOutcome::Started(Handle::Process { pid }) => pid,
        other => panic!("expected a fresh native start, got {:?}", other),
    };
    assert!(pid > 0);

    let second = supervisor.start(id).unwrap();
    assert_eq!(second, StartOutcome::AlreadyRunning(Handle::Process { pid }));

    let info = supervisor.status(id).unwrap();
    assert_eq!(info.status, WorkloadStatus::Running);
    assert_eq!(info.pid, i64::from(pid));

    supervisor.kill(id, true).unwrap();
    let info = supervisor.status(id).unwrap();
    assert_eq!(info.status, WorkloadStatus::Dead);
    assert_eq!(info.pid, -1);

    assert!(wait_until(Duration::from_secs(5), || {
        supervisor.reap().unwrap();
        supervisor.pending_reap_count() == 0
    }));
}

#[test]
fn kill_on_dead_workload_is_not_running() {
    let supervisor = supervisor(vec![native("sleep 30")]);

    let err = supervisor.kill(WorkloadId(0), false).unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning(WorkloadId(0))));
    assert_eq!(
        supervisor.status(WorkloadId(0)).unwrap().status,
        WorkloadStatus::Dead
    );
}

#[test]
fn out_of_range_id_is_not_found() {
    let supervisor = supervisor(vec![native("sleep 30")]);

    assert!(matches!(
        supervisor.start(WorkloadId(1)),
        Err(SupervisorError::NotFound(1))
    ));
    assert!(matches!(
        supervisor.kill(WorkloadId(5), true),
        Err(SupervisorError::NotFound(5))
    ));
    assert!(matches!(
        supervisor.status(WorkloadId(9)),
        Err(SupervisorError::NotFound(9))
    ));
}

#[test]
fn concurrent_starts_spawn_exactly_once() {
    const CALLERS: usize = 8;
    let supervisor = supervisor(vec![native("sleep 30")]);
    let barrier = Arc::new(Barrier::new(CALLERS));

    let outcomes: Vec<StartOutcome> = (0..CALLERS)
        .map(|_| {
            let supervisor = Arc::clone(&supervisor);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                supervisor.start(WorkloadId(0)).unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|t| t.join().unwrap())
        .collect();

    let started = outcomes
        .iter()
        .filter(|o| matches!(o, StartOutcome::Started(_)))
        .count();
    assert_eq!(started, 1);

    let handle = outcomes[0].handle().clone();
    assert!(outcomes.iter().all(|o| *o.handle() == handle));
    assert_eq!(supervisor.registry().running_count(), 1);

    supervisor.kill(WorkloadId(0), true).unwrap();
}

#[test]
fn reaping_marks_self_exited_workload_dead() {
    let supervisor = supervisor(vec![native("sleep 1")]);
    let id = WorkloadId(0);

    supervisor.start(id).unwrap();
    assert_eq!(supervisor.status(id).unwrap().status, WorkloadStatus::Running);

    assert!(wait_until(Duration::from_secs(10), || {
        supervisor.reap().unwrap();
        supervisor.status(id).unwrap().status == WorkloadStatus::Dead
    }));

    let info = supervisor.status(id).unwrap();
    assert_eq!(info.pid, -1);
    assert!(info.last_exit.unwrap().starts_with("exited"));
}

#[tokio::test]
async fn background_reaper_runs_without_client_calls() {
    let supervisor = supervisor(vec![native("true")]);
    let reaper = spawn_reaper(Arc::clone(&supervisor), Duration::from_millis(50));

    let started = Arc::clone(&supervisor);
    tokio::task::spawn_blocking(move || started.start(WorkloadId(0)).unwrap())
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while supervisor.status(WorkloadId(0)).unwrap().status == WorkloadStatus::Running {
        assert!(Instant::now() < deadline, "workload was never reaped");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    reaper.abort();
}

#[test]
fn empty_target_is_a_validation_error() {
    let supervisor = supervisor(vec![WorkloadSpec::new("blank", WorkloadMode::Native, "  ")]);

    assert!(matches!(
        supervisor.start(WorkloadId(0)),
        Err(SupervisorError::Validation(_))
    ));
    assert_eq!(
        supervisor.status(WorkloadId(0)).unwrap().status,
        WorkloadStatus::Dead
    );
}

#[test]
fn spawn_failures_leave_workload_dead() {
    let supervisor = supervisor(vec![
        native("/nonexistent/sermn-missing"),
        native("sleep 1").with_working_directory("/nonexistent/sermn-dir"),
    ]);

    for id in [WorkloadId(0), WorkloadId(1)] {
        let err = supervisor.start(id).unwrap_err();
        assert!(matches!(err, SupervisorError::Spawn { .. }), "{:?}", err);
        assert_eq!(supervisor.status(id).unwrap().status, WorkloadStatus::Dead);
    }
}

#[test]
fn working_directory_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor(vec![
        native("touch started.flag").with_working_directory(dir.path())
    ]);

    supervisor.start(WorkloadId(0)).unwrap();
    let flag = dir.path().join("started.flag");
    assert!(wait_until(Duration::from_secs(5), || flag.exists()));
}

#[test]
fn graceful_stop_of_native_workload() {
    let supervisor = supervisor(vec![native("sleep 30")]);
    let id = WorkloadId(0);

    let StartOutcome::Started(Handle::Process { pid }) = supervisor.start(id).unwrap() else {
        panic!("expected a native start");
    };
    supervisor.kill(id, false).unwrap();

    let info = supervisor.status(id).unwrap();
    assert_eq!(info.status, WorkloadStatus::Dead);
    assert_eq!(info.last_exit.as_deref(), Some("stopped"));

    assert!(wait_until(Duration::from_secs(5), || {
        supervisor.reap().unwrap();
        supervisor.pending_reap_count() == 0
    }));
    assert!(!platform::is_process_running(pid));
}

#[test]
fn container_stop_failure_keeps_workload_running() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor_with(
        vec![
            native("sleep 30"),
            WorkloadSpec::new("db", WorkloadMode::Container, "mydb"),
        ],
        fake_runtime(dir.path(), FAILING_STOP_RUNTIME, Duration::from_secs(5)),
    );
    let id = WorkloadId(1);

    let outcome = supervisor.start(id).unwrap();
    assert_eq!(
        outcome,
        StartOutcome::Started(Handle::Container {
            id: "mydb".into(),
            pid: Some(4242),
        })
    );
    let info = supervisor.status(id).unwrap();
    assert_eq!(info.pid, 4242);
    assert_eq!(info.handle.as_deref(), Some("mydb"));

    let err = supervisor.kill(id, false).unwrap_err();
    match err {
        SupervisorError::Kill { id: failed, reason } => {
            assert_eq!(failed, id);
            assert!(reason.contains("stop refused"), "{}", reason);
        }
        other => panic!("expected KillError, got {:?}", other),
    }
    assert_eq!(supervisor.status(id).unwrap().status, WorkloadStatus::Running);

    supervisor.kill(id, true).unwrap();
    assert_eq!(supervisor.status(id).unwrap().status, WorkloadStatus::Dead);
}

#[test]
fn hanging_container_stop_escalates_to_kill() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor_with(
        vec![WorkloadSpec::new("db", WorkloadMode::Container, "mydb")],
        fake_runtime(dir.path(), HANGING_STOP_RUNTIME, Duration::from_millis(500)),
    );
    let id = WorkloadId(0);

    supervisor.start(id).unwrap();
    assert_eq!(supervisor.status(id).unwrap().pid, 0);

    let started = Instant::now();
    supervisor.kill(id, false).unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(supervisor.status(id).unwrap().status, WorkloadStatus::Dead);
}

#[test]
fn container_start_failure_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor_with(
        vec![WorkloadSpec::new("db", WorkloadMode::Container, "mydb")],
        fake_runtime(dir.path(), BROKEN_RUNTIME, Duration::from_secs(5)),
    );

    let err = supervisor.start(WorkloadId(0)).unwrap_err();
    match err {
        SupervisorError::Spawn { reason, .. } => {
            assert!(reason.contains("no such container"), "{}", reason)
        }
        other => panic!("expected SpawnError, got {:?}", other),
    }
    assert_eq!(
        supervisor.status(WorkloadId(0)).unwrap().status,
        WorkloadStatus::Dead
    );
}

#[test]
fn shutdown_all_stops_every_running_workload() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor_with(
        vec![
            native("sleep 30"),
            native("sleep 30"),
            WorkloadSpec::new("db", WorkloadMode::Container, "mydb"),
        ],
        fake_runtime(dir.path(), HANGING_STOP_RUNTIME, Duration::from_millis(500)),
    );

    for id in [WorkloadId(0), WorkloadId(2)] {
        supervisor.start(id).unwrap();
    }
    assert_eq!(supervisor.registry().running_count(), 2);

    supervisor.shutdown_all();

    assert_eq!(supervisor.registry().running_count(), 0);
    assert_eq!(supervisor.pending_reap_count(), 0);
}

#[test]
fn slow_container_start_does_not_stall_reads_or_reaping() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor_with(
        vec![
            WorkloadSpec::new("db", WorkloadMode::Container, "mydb"),
            native("sleep 30"),
        ],
        fake_runtime(dir.path(), SLOW_START_RUNTIME, Duration::from_secs(10)),
    );
    supervisor.start(WorkloadId(1)).unwrap();

    let starter = {
        let supervisor = Arc::clone(&supervisor);
        std::thread::spawn(move || supervisor.start(WorkloadId(0)))
    };
    std::thread::sleep(Duration::from_millis(300));

    let began = Instant::now();
    let snapshot = supervisor.registry().snapshot().unwrap();
    assert!(began.elapsed() < Duration::from_millis(300));
    assert_eq!(snapshot[0].status, WorkloadStatus::Dead);
    assert_eq!(snapshot[1].status, WorkloadStatus::Running);

    let began = Instant::now();
    assert_eq!(
        supervisor.status(WorkloadId(0)).unwrap().status,
        WorkloadStatus::Dead
    );
    assert!(began.elapsed() < Duration::from_millis(300));

    let began = Instant::now();
    assert_eq!(supervisor.reap().unwrap(), 0);
    assert!(began.elapsed() < Duration::from_millis(300));

    let outcome = starter.join().unwrap().unwrap();
    assert_eq!(
        outcome,
        StartOutcome::Started(Handle::Container {
            id: "mydb".to_string(),
            pid: None,
        })
    );
    assert_eq!(
        supervisor.status(WorkloadId(0)).unwrap().status,
        WorkloadStatus::Running
    );

    supervisor.kill(WorkloadId(1), true).unwrap();
}

#[test]
fn runtime_output_larger_than_pipe_buffer_is_drained() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor = supervisor_with(
        vec![WorkloadSpec::new("db", WorkloadMode::Container, "mydb")],
        fake_runtime(dir.path(), CHATTY_RUNTIME, Duration::from_secs(5)),
    );
    let id = WorkloadId(0);

    let outcome = supervisor.start(id).unwrap();
    assert_eq!(
        outcome,
        StartOutcome::Started(Handle::Container {
            id: "mydb".to_string(),
            pid: Some(4242),
        })
    );

    supervisor.kill(id, false).unwrap();
    let info = supervisor.status(id).unwrap();
    assert_eq!(info.status, WorkloadStatus::Dead);
    assert_eq!(info.last_exit.as_deref(), Some("stopped"));
}

#[test]
fn child_ignoring_sigterm_is_reported_and_killed_at_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("stubborn.sh");
    std::fs::write(&script, STUBBORN_SCRIPT).unwrap();

    let supervisor = supervisor_with(
        vec![native(&format!("sh {}", script.display()))],
        SupervisorOptions {
            shutdown_grace: Duration::from_millis(200),
            ..SupervisorOptions::default()
        },
    );
    let id = WorkloadId(0);

    let pid = supervisor.start(id).unwrap().handle().pid().unwrap();
    // Let the shell install its trap
    std::thread::sleep(Duration::from_millis(300));

    supervisor.kill(id, false).unwrap();
    assert_eq!(supervisor.status(id).unwrap().status, WorkloadStatus::Dead);

    assert!(wait_until(Duration::from_secs(5), || {
        supervisor.lingering_children().unwrap() == vec![id]
    }));
    assert!(platform::is_process_running(pid));
    assert_eq!(supervisor.pending_reap_count(), 1);

    supervisor.shutdown_all();
    assert_eq!(supervisor.pending_reap_count(), 0);
    assert!(!platform::is_process_running(pid));
}

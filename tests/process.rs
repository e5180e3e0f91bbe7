//! Child supervision against real shell scripts

use ensemble_supervisor::render::{kafka_defaults, ResolvedProperties};
use ensemble_supervisor::{ChildSupervisor, EnsembleSnapshot, RunState, Supervise};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn properties() -> ResolvedProperties {
    ResolvedProperties::from_template(
        "broker.id={{KAFKA_BROKER_ID}}\nzookeeper.connect={{ZOOKEEPER_CONNECTION_STRING}}\n",
        |_| None,
        &kafka_defaults(""),
    )
}

async fn wait_for_exit<S: Supervise>(supervisor: &S, handle: &mut S::Handle) -> RunState {
    for _ in 0..200 {
        let state = supervisor.poll(handle).unwrap();
        if state != RunState::Running {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("child did not exit");
}

#[tokio::test]
async fn test_start_writes_config_and_passes_path() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("server.properties");
    let seen = dir.path().join("seen");
    // record the argument the server was launched with
    let command = script(
        dir.path(),
        "server.sh",
        &format!("echo \"$1\" > {}", seen.display()),
    );

    std::fs::write(&output, "stale content that is much longer than the new file").unwrap();

    let supervisor = ChildSupervisor::new(command, output.clone());
    let ensemble = EnsembleSnapshot::from_addresses(["10.0.0.2:2181", "10.0.0.1:2181"]);
    let mut handle = supervisor.start(&properties(), &ensemble).await.unwrap();

    assert!(handle.pid().is_some());
    assert_eq!(handle.ensemble(), &ensemble);
    assert_eq!(
        wait_for_exit(&supervisor, &mut handle).await,
        RunState::ExitedNormally
    );

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "broker.id=-1\nzookeeper.connect=10.0.0.1:2181,10.0.0.2:2181\n"
    );
    assert_eq!(
        std::fs::read_to_string(&seen).unwrap().trim(),
        output.display().to_string()
    );
}

#[tokio::test]
async fn test_poll_reports_exit_code() {
    let dir = TempDir::new().unwrap();
    let command = script(dir.path(), "server.sh", "exit 3");
    let supervisor = ChildSupervisor::new(command, dir.path().join("server.properties"));

    let mut handle = supervisor
        .start(&properties(), &EnsembleSnapshot::empty())
        .await
        .unwrap();
    assert_eq!(
        wait_for_exit(&supervisor, &mut handle).await,
        RunState::ExitedWithError(3)
    );
    // the result sticks once observed
    assert_eq!(
        supervisor.poll(&mut handle).unwrap(),
        RunState::ExitedWithError(3)
    );
    // stopping an exited child is a no-op
    supervisor.stop(&mut handle).await.unwrap();
}

#[tokio::test]
async fn test_stop_terminates_running_child() {
    let dir = TempDir::new().unwrap();
    let command = script(dir.path(), "server.sh", "exec sleep 30");
    let supervisor = ChildSupervisor::new(command, dir.path().join("server.properties"));

    let mut handle = supervisor
        .start(&properties(), &EnsembleSnapshot::empty())
        .await
        .unwrap();
    assert_eq!(supervisor.poll(&mut handle).unwrap(), RunState::Running);

    supervisor.stop(&mut handle).await.unwrap();
    assert_eq!(
        supervisor.poll(&mut handle).unwrap(),
        RunState::ExitedWithError(-15)
    );
}

#[tokio::test]
async fn test_stop_escalates_after_timeout() {
    let dir = TempDir::new().unwrap();
    let command = script(
        dir.path(),
        "server.sh",
        "trap '' TERM\nwhile true; do sleep 1; done",
    );
    let supervisor = ChildSupervisor::new(command, dir.path().join("server.properties"))
        .with_stop_timeout(Some(Duration::from_millis(300)));

    let mut handle = supervisor
        .start(&properties(), &EnsembleSnapshot::empty())
        .await
        .unwrap();
    // let the shell install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    supervisor.stop(&mut handle).await.unwrap();
    assert_eq!(
        supervisor.poll(&mut handle).unwrap(),
        RunState::ExitedWithError(-9)
    );
}

#[tokio::test]
async fn test_missing_command_fails_to_spawn() {
    let dir = TempDir::new().unwrap();
    let supervisor = ChildSupervisor::new(
        dir.path().join("does-not-exist.sh"),
        dir.path().join("server.properties"),
    );

    let err = supervisor
        .start(&properties(), &EnsembleSnapshot::empty())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), ensemble_supervisor::common::EXIT_INTERNAL);
}

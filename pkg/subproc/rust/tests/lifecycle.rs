// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::time::{Duration, Instant};

use dd_subproc::{Error, Launcher, StdioConfig};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

// ===========================================================================
// Group 1: Reaper accounting
// ===========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repeated_start_stop_does_not_accumulate_tasks() {
    let metrics = tokio::runtime::Handle::current().metrics();
    let base = metrics.num_alive_tasks();

    let launcher = quiet();
    for _ in 0..120 {
        let p = launcher
            .command("/bin/sh", ["-c", "exit 0"])
            .start()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(3)).await;
        p.stop(Duration::from_secs(5)).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = metrics.num_alive_tasks();
    assert!(
        after <= base + 20,
        "alive task count grew from {base} to {after}"
    );
}

// ===========================================================================
// Group 2: Restart
// ===========================================================================

#[tokio::test]
async fn test_restart_runs_the_same_command_twice() {
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.log");
    let out = File::create(&out_path).unwrap();

    let p = Launcher::new()
        .stdout(StdioConfig::file(out))
        .stderr(StdioConfig::Null)
        .command("/bin/sh", ["-c", "echo restart-ok"])
        .start()
        .unwrap();
    p.wait().await.unwrap();

    let next = p.restart(Duration::from_secs(5)).await.unwrap();
    next.wait().await.unwrap();
    assert_ne!(p.id(), next.id(), "restart must produce a new process");

    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(contents.matches("restart-ok").count(), 2);
}

#[tokio::test]
async fn test_restart_preserves_dir_and_env() {
    let token = "restart-token-123";
    let dir = tempfile::tempdir().unwrap();
    let out_path = dir.path().join("out.log");
    let out = File::create(&out_path).unwrap();

    let p = Launcher::new()
        .dir(dir.path())
        .env_var("SUBPROC_RESTART_TOKEN", token)
        .stdout(StdioConfig::file(out))
        .stderr(StdioConfig::Null)
        .command(
            "/bin/sh",
            ["-c", r#"printf '%s|%s\n' "$SUBPROC_RESTART_TOKEN" "$(pwd -P)""#],
        )
        .start()
        .unwrap();
    p.wait().await.unwrap();

    let next = p.restart(Duration::from_secs(5)).await.unwrap();
    next.wait().await.unwrap();

    let canonical = dir.path().canonicalize().unwrap();
    let expect = format!("{token}|{}", canonical.display());
    let contents = std::fs::read_to_string(&out_path).unwrap();
    assert_eq!(
        contents.lines().filter(|line| *line == expect).count(),
        2,
        "both runs should report the token and working directory: {contents:?}"
    );
}

#[tokio::test]
async fn test_extra_file_is_fd_3_and_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extra.log");
    let extra = File::create(&path).unwrap();

    let p = quiet()
        .command("/bin/sh", ["-c", "echo hello-fd >&3"])
        .extra_file(extra)
        .start()
        .unwrap();
    p.wait().await.unwrap();

    let next = p.restart(Duration::from_secs(5)).await.unwrap();
    next.wait().await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.matches("hello-fd").count(), 2);
}

// ===========================================================================
// Group 3: Deadlines and escalation
// ===========================================================================

#[tokio::test]
async fn test_wait_timeout_leaves_no_process_behind() {
    let p = quiet().command("/bin/sleep", ["5"]).start().unwrap();
    let pid = p.id().unwrap();

    let start = Instant::now();
    p.wait_timeout(Duration::from_millis(50)).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(
        wait_for_pid_gone(pid, Duration::from_secs(5)),
        "pid {pid} should be gone after the deadline kill"
    );
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill_when_sigterm_is_ignored() {
    let p = quiet()
        .command("/bin/sh", ["-c", "trap '' TERM; sleep 60"])
        .start()
        .unwrap();
    // Give the shell a beat to install the trap.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    p.stop(Duration::from_millis(100)).await.unwrap();
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "escalation should return close to the grace period, took {:?}",
        start.elapsed()
    );

    match p.wait().await {
        Err(Error::Exited(status)) => {
            assert_eq!(status.signal(), Some(Signal::SIGKILL as i32));
        }
        other => panic!("expected SIGKILL termination, got {other:?}"),
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn quiet() -> Launcher {
    Launcher::new()
        .stdout(StdioConfig::Null)
        .stderr(StdioConfig::Null)
}

fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

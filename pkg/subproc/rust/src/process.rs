// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::{OnceCell, watch};
use tokio::time::{Duration, timeout};

use crate::command::CommandConfig;
use crate::error::{Error, Result};

/// Lifecycle controller for one launched OS process.
///
/// The child handle itself lives with the reaper task spawned at launch;
/// the controller signals the process by pid and observes its exit through
/// the reaper's single deposit. All methods take `&self`, so callers may
/// race freely: the termination guard runs the signal-and-wait body once,
/// and every caller observes the recorded outcome.
pub struct Process {
    config: CommandConfig,
    pid: Option<Pid>,
    exit: watch::Receiver<Option<Result<()>>>,
    terminated: OnceCell<Result<()>>,
}

impl Process {
    /// Launch the process described by `config` and spawn its reaper task.
    pub(crate) fn launch(config: CommandConfig) -> Result<Process> {
        let spawn_err = |e: io::Error| Error::Spawn {
            program: config.program.clone(),
            source: Arc::new(e),
        };

        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);
        cmd.env_clear();
        cmd.envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(ref dir) = config.dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(config.stdin.to_stdio().map_err(&spawn_err)?);
        cmd.stdout(config.stdout.to_stdio().map_err(&spawn_err)?);
        cmd.stderr(config.stderr.to_stdio().map_err(&spawn_err)?);
        if !config.extra_files.is_empty() {
            pass_extra_files(&mut cmd, &config.extra_files);
        }

        let mut child = cmd.spawn().map_err(&spawn_err)?;

        let pid = child.id().map(|id| Pid::from_raw(id as i32));
        info!(
            "spawned {} (pid={})",
            config.program,
            pid.map_or(0, Pid::as_raw)
        );

        let (tx, rx) = watch::channel(None);
        let program = config.program.clone();
        tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) if status.success() => {
                    info!("{program} exited with {status}");
                    Ok(())
                }
                Ok(status) => {
                    info!("{program} exited with {status}");
                    Err(Error::Exited(status))
                }
                Err(e) => {
                    warn!("wait on {program} failed: {e}");
                    Err(Error::Wait(Arc::new(e)))
                }
            };
            // Never blocks; the value is retained even if nobody is
            // waiting yet.
            let _ = tx.send(Some(outcome));
        });

        Ok(Process {
            config,
            pid,
            exit: rx,
            terminated: OnceCell::new(),
        })
    }

    /// OS pid recorded at launch.
    pub fn id(&self) -> Option<u32> {
        self.pid.map(|pid| pid.as_raw() as u32)
    }

    /// Wait for the process to terminate naturally.
    ///
    /// The terminal outcome is retained: calling `wait` again after the
    /// process exited, or after `stop`/`kill` already drained it, returns
    /// the same recorded result.
    pub async fn wait(&self) -> Result<()> {
        self.exited().await
    }

    /// Wait for termination, killing the process if `dur` elapses first.
    ///
    /// Expiry never merely reports: a caller that abandons a wait wants
    /// the process gone, so the deadline path returns [`Process::kill`]'s
    /// result instead of a timeout error.
    pub async fn wait_timeout(&self, dur: Duration) -> Result<()> {
        match timeout(dur, self.exited()).await {
            Ok(outcome) => outcome,
            Err(_) => self.kill().await,
        }
    }

    /// Stop the process: SIGTERM first, escalating to SIGKILL if it has
    /// not exited within `grace`.
    ///
    /// Idempotent. Concurrent and repeated calls — including [`Process::kill`],
    /// which shares the same guard — run the termination body once; every
    /// caller observes the recorded outcome.
    pub async fn stop(&self, grace: Duration) -> Result<()> {
        self.terminated
            .get_or_init(|| self.stop_body(grace))
            .await
            .clone()
    }

    /// Forcefully kill the process and wait for it to be reaped.
    ///
    /// No deadline: SIGKILL cannot be caught, so a delivered kill is
    /// assumed always eventually effective.
    pub async fn kill(&self) -> Result<()> {
        self.terminated.get_or_init(|| self.kill_body()).await.clone()
    }

    /// Stop the process, then launch a fresh one from the same descriptor.
    ///
    /// The new controller is fully independent (new pid, exit channel, and
    /// termination guard); the descriptor's stream and extra-file handles
    /// are reused, not copied. A stop failure is propagated without
    /// attempting the new launch.
    pub async fn restart(&self, grace: Duration) -> Result<Process> {
        self.stop(grace).await?;
        Process::launch(self.config.clone())
    }

    async fn stop_body(&self, grace: Duration) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        if self.exit.borrow().is_some() {
            return Ok(());
        }

        let mut expected = Signal::SIGTERM;
        debug!("sending SIGTERM to {} (pid={pid})", self.config.program);
        match signal::kill(pid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => {
                // Cooperative delivery failed; go straight to SIGKILL.
                warn!("failed to send SIGTERM to pid {pid}: {e}, sending SIGKILL");
                expected = Signal::SIGKILL;
                match signal::kill(pid, Signal::SIGKILL) {
                    Ok(()) => {}
                    Err(Errno::ESRCH) => return Ok(()),
                    Err(e) => {
                        return Err(Error::Signal {
                            pid: pid.as_raw(),
                            source: e,
                        });
                    }
                }
            }
        }

        match timeout(grace, self.exited()).await {
            Ok(outcome) => suppress_expected(outcome, expected),
            Err(_) => {
                warn!(
                    "stop grace period ({}ms) elapsed for pid {pid}, sending SIGKILL",
                    grace.as_millis()
                );
                self.kill_body().await
            }
        }
    }

    async fn kill_body(&self) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        if self.exit.borrow().is_some() {
            return Ok(());
        }

        debug!("sending SIGKILL to {} (pid={pid})", self.config.program);
        match signal::kill(pid, Signal::SIGKILL) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => {
                return Err(Error::Signal {
                    pid: pid.as_raw(),
                    source: e,
                });
            }
        }

        suppress_expected(self.exited().await, Signal::SIGKILL)
    }

    /// Read the reaper's deposit, blocking until it lands. Every reader,
    /// first or later, observes the same stored value.
    async fn exited(&self) -> Result<()> {
        let mut rx = self.exit.clone();
        let value = match rx.wait_for(|v| v.is_some()).await {
            Ok(v) => (*v).clone(),
            Err(_) => return Err(Error::ExitChannelClosed),
        };
        value.unwrap_or(Err(Error::ExitChannelClosed))
    }
}

/// An exit caused by the signal we sent is a successful termination.
fn suppress_expected(outcome: Result<()>, expected: Signal) -> Result<()> {
    match outcome {
        Err(e) if e.exited_by(expected) => Ok(()),
        other => other,
    }
}

/// Hand `files` to the child as fds 3, 4, … in order.
fn pass_extra_files(cmd: &mut Command, files: &[Arc<File>]) {
    let fds: Vec<RawFd> = files.iter().map(|f| f.as_raw_fd()).collect();
    unsafe {
        cmd.pre_exec(move || {
            for (i, &fd) in fds.iter().enumerate() {
                let target = 3 + i as libc::c_int;
                if fd == target {
                    // dup2 would be a no-op and leave close-on-exec set.
                    let flags = libc::fcntl(fd, libc::F_GETFD);
                    if flags == -1
                        || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) == -1
                    {
                        return Err(io::Error::last_os_error());
                    }
                } else if libc::dup2(fd, target) == -1 {
                    return Err(io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

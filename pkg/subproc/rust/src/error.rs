// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use nix::sys::signal::Signal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by process launch and termination.
///
/// `Clone` so a single recorded outcome can be replayed to every caller
/// that raced on the same stop, kill, or wait.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The OS rejected process creation.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// The process terminated unsuccessfully (non-zero code or signal).
    #[error("process exited unsuccessfully: {0}")]
    Exited(ExitStatus),

    /// Sending a signal failed for a reason other than the process being gone.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::Error,
    },

    /// The OS-level wait on the child failed.
    #[error("waiting on process failed: {0}")]
    Wait(#[source] Arc<io::Error>),

    /// The exit notifier went away without reporting a result.
    #[error("process exit notification channel closed")]
    ExitChannelClosed,
}

impl Error {
    /// True when the process was terminated by `sig`.
    pub fn exited_by(&self, sig: Signal) -> bool {
        use std::os::unix::process::ExitStatusExt;
        matches!(self, Error::Exited(status) if status.signal() == Some(sig as i32))
    }
}

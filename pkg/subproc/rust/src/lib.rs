// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Lifecycle control for a single child process: start it, wait for it with
//! a deadline, stop it gracefully with escalation to SIGKILL, or restart it
//! from the same configuration. A [`Launcher`] holds process-wide defaults
//! and stamps them onto per-command [`CommandConfig`] descriptors; starting
//! one yields a [`Process`] controller that is safe to wait on, stop, and
//! kill from concurrent callers.

mod command;
mod error;
mod process;

pub use command::{CommandConfig, Launcher, StdioConfig};
pub use error::{Error, Result};
pub use process::Process;

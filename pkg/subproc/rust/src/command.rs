// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::process::Process;

/// Destination for one of the child's standard streams.
///
/// Unlike `std::process::Stdio`, a `StdioConfig` can mint a fresh `Stdio`
/// for every launch, so a restarted process writes through the same handle
/// as the original rather than a copy.
#[derive(Debug, Clone, Default)]
pub enum StdioConfig {
    #[default]
    Inherit,
    Null,
    File(Arc<File>),
}

impl StdioConfig {
    pub fn file(file: File) -> Self {
        StdioConfig::File(Arc::new(file))
    }

    pub(crate) fn to_stdio(&self) -> io::Result<Stdio> {
        match self {
            StdioConfig::Inherit => Ok(Stdio::inherit()),
            StdioConfig::Null => Ok(Stdio::null()),
            StdioConfig::File(file) => Ok(file.try_clone()?.into()),
        }
    }
}

/// Process-wide launch defaults: working directory, environment, and
/// standard-stream destinations. Produces one [`CommandConfig`] per command.
#[derive(Debug, Clone)]
pub struct Launcher {
    dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    stdin: StdioConfig,
    stdout: StdioConfig,
    stderr: StdioConfig,
}

impl Launcher {
    /// Defaults: the parent's environment, inherited streams, no working
    /// directory override.
    pub fn new() -> Self {
        Self {
            dir: None,
            env: std::env::vars().collect(),
            stdin: StdioConfig::Inherit,
            stdout: StdioConfig::Inherit,
            stderr: StdioConfig::Inherit,
        }
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Replace the default environment wholesale.
    pub fn env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Add one variable on top of the current defaults. On duplicate keys
    /// the later entry wins at launch.
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, stdin: StdioConfig) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn stdout(mut self, stdout: StdioConfig) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn stderr(mut self, stderr: StdioConfig) -> Self {
        self.stderr = stderr;
        self
    }

    /// Produce a descriptor for `program` stamped with the current defaults.
    pub fn command<I, S>(&self, program: impl Into<String>, args: I) -> CommandConfig
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandConfig {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            dir: self.dir.clone(),
            env: self.env.clone(),
            stdin: self.stdin.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            extra_files: Vec::new(),
        }
    }
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable launch parameters for one OS process.
///
/// Cloning shares the stream and extra-file handles rather than copying
/// them; a clone launched later (see [`Process::restart`]) writes through
/// the same underlying descriptors.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: StdioConfig,
    pub stdout: StdioConfig,
    pub stderr: StdioConfig,
    /// Inherited by the child as fds 3, 4, … in order.
    pub extra_files: Vec<Arc<File>>,
}

impl CommandConfig {
    pub fn extra_file(mut self, file: File) -> Self {
        self.extra_files.push(Arc::new(file));
        self
    }

    /// Launch the process. On failure there is no controller and no
    /// background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<Process> {
        Process::launch(self)
    }

    /// Start, then wait for natural termination.
    pub async fn run(self) -> Result<()> {
        self.start()?.wait().await
    }

    /// Start, then wait; the process is killed if `dur` elapses first.
    pub async fn run_timeout(self, dur: Duration) -> Result<()> {
        self.start()?.wait_timeout(dur).await
    }
}

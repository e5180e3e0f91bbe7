//! Supervised server process
//!
//! Exactly one child per supervisor. The child is launched as
//! `<command> <output_path>` after the rendered properties (with the ensemble
//! spliced in) have been written to `output_path`.

use crate::common::{Error, Result, SupervisorConfig};
use crate::discovery::EnsembleSnapshot;
use crate::render::ResolvedProperties;
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Liveness of the supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    ExitedNormally,
    ExitedWithError(i32),
}

impl RunState {
    pub fn from_status(status: ExitStatus) -> Self {
        match exit_code(status) {
            0 => RunState::ExitedNormally,
            code => RunState::ExitedWithError(code),
        }
    }

    /// Code the supervisor should exit with, if the child is gone
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunState::Running => None,
            RunState::ExitedNormally => Some(0),
            RunState::ExitedWithError(code) => Some(*code),
        }
    }
}

/// Exit code, or the negated signal number for a signalled child
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(1))
}

/// Start, poll and stop the managed server
#[async_trait]
pub trait Supervise: Send + Sync {
    type Handle: Send;

    /// Write the final configuration and launch; returns without waiting
    async fn start(
        &self,
        properties: &ResolvedProperties,
        ensemble: &EnsembleSnapshot,
    ) -> Result<Self::Handle>;

    /// Non-blocking liveness check
    fn poll(&self, handle: &mut Self::Handle) -> Result<RunState>;

    /// Ask the child to terminate and wait until it has exited
    async fn stop(&self, handle: &mut Self::Handle) -> Result<()>;
}

/// Handle to a launched server, owned by the control loop
#[derive(Debug)]
pub struct ChildProcessHandle {
    child: Child,
    pid: Option<u32>,
    ensemble: EnsembleSnapshot,
    status: Option<ExitStatus>,
}

impl ChildProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ensemble baked into this child's configuration
    pub fn ensemble(&self) -> &EnsembleSnapshot {
        &self.ensemble
    }
}

/// Runs the server as a local subprocess
#[derive(Debug, Clone)]
pub struct ChildSupervisor {
    command: PathBuf,
    output_path: PathBuf,
    stop_timeout: Option<Duration>,
}

impl ChildSupervisor {
    pub fn new(command: PathBuf, output_path: PathBuf) -> Self {
        Self {
            command,
            output_path,
            stop_timeout: None,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.command.clone(), config.output_path.clone())
            .with_stop_timeout(config.stop_timeout)
    }

    /// Escalate to SIGKILL when SIGTERM has not worked within `timeout`
    pub fn with_stop_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn terminate(handle: &ChildProcessHandle) -> Result<()> {
        let Some(pid) = handle.pid else {
            return Ok(());
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            // already gone, wait() will reap it
            Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::Signal(format!("kill({}, SIGTERM) failed: {}", pid, e))),
        }
    }
}

#[async_trait]
impl Supervise for ChildSupervisor {
    type Handle = ChildProcessHandle;

    async fn start(
        &self,
        properties: &ResolvedProperties,
        ensemble: &EnsembleSnapshot,
    ) -> Result<ChildProcessHandle> {
        tokio::fs::write(&self.output_path, properties.with_ensemble(ensemble)).await?;

        tracing::info!("Starting server: {}", ensemble);
        let child = Command::new(&self.command)
            .arg(&self.output_path)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: self.command.display().to_string(),
                source,
            })?;

        let pid = child.id();
        tracing::debug!("Server pid: {:?}", pid);
        Ok(ChildProcessHandle {
            child,
            pid,
            ensemble: ensemble.clone(),
            status: None,
        })
    }

    fn poll(&self, handle: &mut ChildProcessHandle) -> Result<RunState> {
        if let Some(status) = handle.status {
            return Ok(RunState::from_status(status));
        }
        match handle.child.try_wait()? {
            Some(status) => {
                handle.status = Some(status);
                Ok(RunState::from_status(status))
            }
            None => Ok(RunState::Running),
        }
    }

    async fn stop(&self, handle: &mut ChildProcessHandle) -> Result<()> {
        if handle.status.is_some() {
            return Ok(());
        }

        tracing::info!("Stopping server (pid {:?})", handle.pid);
        Self::terminate(handle)?;

        let status = match self.stop_timeout {
            None => handle.child.wait().await?,
            Some(timeout) => match tokio::time::timeout(timeout, handle.child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    tracing::warn!(
                        "Server did not exit within {:?} of SIGTERM, killing",
                        timeout
                    );
                    handle.child.kill().await?;
                    handle.child.wait().await?
                }
            },
        };

        tracing::info!("Server exited: {}", status);
        handle.status = Some(status);
        Ok(())
    }
}

//! Top-level supervision loop
//!
//! ```text
//! Starting ──► Running ──(ensemble grew/moved)──► Restarting ──► Running
//!                 │                                   │
//!                 ├─(child exited)──► Stopped(code)   └─(lock/connect failed)──► error
//!                 └─(budget spent / shutdown)──► Stopped(0)
//! ```
//!
//! Everything runs sequentially on one task: poll the child, rediscover the
//! ensemble, restart under the fleet lock when it changed, sleep.

use crate::common::{Result, SupervisorConfig};
use crate::coordinator::{Coordination, RestartCoordinator};
use crate::discovery::{Discover, EnsembleSnapshot};
use crate::process::Supervise;
use crate::render::ResolvedProperties;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Restarting,
    Stopped(i32),
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Starting => write!(f, "starting"),
            LoopState::Running => write!(f, "running"),
            LoopState::Restarting => write!(f, "restarting"),
            LoopState::Stopped(code) => write!(f, "stopped({})", code),
        }
    }
}

/// Loop timing
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub settle_interval: Duration,
    /// Number of ticks before a clean stop; `None` runs until the child dies
    pub iterations: Option<u64>,
}

impl From<&SupervisorConfig> for LoopSettings {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            settle_interval: config.settle_interval,
            iterations: config.iterations,
        }
    }
}

pub struct ControlLoop<D, S, C> {
    discovery: D,
    supervisor: S,
    coordinator: RestartCoordinator<C>,
    properties: ResolvedProperties,
    settings: LoopSettings,
    state: LoopState,
    ensemble: EnsembleSnapshot,
    restarts: u64,
}

impl<D, S, C> ControlLoop<D, S, C>
where
    D: Discover,
    S: Supervise,
    C: Coordination,
{
    pub fn new(
        discovery: D,
        supervisor: S,
        coordinator: RestartCoordinator<C>,
        properties: ResolvedProperties,
        settings: LoopSettings,
    ) -> Self {
        Self {
            discovery,
            supervisor,
            coordinator,
            properties,
            settings,
            state: LoopState::Starting,
            ensemble: EnsembleSnapshot::empty(),
            restarts: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Ensemble the running server was started with
    pub fn ensemble(&self) -> &EnsembleSnapshot {
        &self.ensemble
    }

    /// Completed coordinated restarts
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    pub fn coordinator(&self) -> &RestartCoordinator<C> {
        &self.coordinator
    }

    /// Run until the child exits or the iteration budget is spent
    pub async fn run(&mut self) -> Result<i32> {
        self.run_until(std::future::pending()).await
    }

    /// Like `run`, but a resolved `shutdown` stops the child and returns 0.
    ///
    /// Shutdown is honoured at every await point, including a restart that is
    /// still waiting for the fleet lock or settling inside it. Abandoning a
    /// restart drops its coordination session, which gives the lock back.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<i32>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.state = LoopState::Starting;
        let discovered = tokio::select! {
            discovered = self.discovery.discover() => discovered,
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested before the server was started");
                self.state = LoopState::Stopped(0);
                return Ok(0);
            }
        };
        self.ensemble = discovered;
        if self.ensemble.is_empty() {
            tracing::warn!("No ensemble discovered, starting server without one");
        }
        let mut child = self.supervisor.start(&self.properties, &self.ensemble).await?;
        self.state = LoopState::Running;

        let mut remaining = self.settings.iterations;
        while remaining != Some(0) {
            let ticked = tokio::select! {
                ticked = self.tick(&mut child) => Some(ticked),
                _ = &mut shutdown => None,
            };
            match ticked {
                Some(Ok(Some(code))) => {
                    self.state = LoopState::Stopped(code);
                    return Ok(code);
                }
                Some(Ok(None)) => {}
                Some(Err(e)) => {
                    tracing::error!("Supervision failed in state {}: {}", self.state, e);
                    if let Err(stop_err) = self.supervisor.stop(&mut child).await {
                        tracing::warn!("Stopping server after failure: {}", stop_err);
                    }
                    return Err(e);
                }
                None => return self.shut_down(&mut child).await,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = &mut shutdown => return self.shut_down(&mut child).await,
            }

            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
        }

        tracing::info!("Iteration budget exhausted");
        self.state = LoopState::Stopped(0);
        Ok(0)
    }

    async fn shut_down(&mut self, child: &mut S::Handle) -> Result<i32> {
        tracing::info!("Shutdown requested in state {}, stopping server", self.state);
        self.supervisor.stop(child).await?;
        self.state = LoopState::Stopped(0);
        Ok(0)
    }

    /// One pass; `Some(code)` once the child has exited
    async fn tick(&mut self, child: &mut S::Handle) -> Result<Option<i32>> {
        let run_state = self.supervisor.poll(child)?;
        if let Some(code) = run_state.exit_code() {
            tracing::info!("Server died: {}", code);
            return Ok(Some(code));
        }

        let discovered = self.discovery.discover().await;
        if discovered.supersedes(&self.ensemble) {
            tracing::info!("ZooKeeper ensemble change: {}", discovered);
            self.state = LoopState::Restarting;
            self.restart(child, &discovered).await?;
            self.ensemble = discovered;
            self.restarts += 1;
            self.state = LoopState::Running;
        } else if discovered != self.ensemble && !discovered.is_empty() {
            tracing::debug!(
                "Ignoring smaller ensemble {} (current {})",
                discovered,
                self.ensemble
            );
        }
        Ok(None)
    }

    /// Stop and start the child inside the fleet lock, then let it settle
    /// before the lock is handed to the next supervisor.
    async fn restart(&self, child: &mut S::Handle, ensemble: &EnsembleSnapshot) -> Result<()> {
        let supervisor = &self.supervisor;
        let properties = &self.properties;
        let settle = self.settings.settle_interval;

        self.coordinator
            .coordinate_restart(ensemble, move |ensemble| async move {
                supervisor.stop(child).await?;
                *child = supervisor.start(properties, &ensemble).await?;
                tokio::time::sleep(settle).await;
                Ok(())
            })
            .await
    }
}

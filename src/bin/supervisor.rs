//! Supervisor binary

use clap::Parser;
use ensemble_supervisor::common::{parse_duration, SupervisorConfig, EXIT_CONFIG_MISSING};
use ensemble_supervisor::render::{self, ResolvedProperties, ADVERTISED_HOST_ENV};
use ensemble_supervisor::{
    ChildSupervisor, ControlLoop, ExhibitorDiscovery, LoopSettings, RestartCoordinator,
    ZooKeeperCoordination,
};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ensemble-supervisor")]
#[command(about = "Runs a server and restarts it, one fleet member at a time, when its ZooKeeper ensemble changes")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Exhibitor base URL
    #[arg(long, env = "EXHIBITOR_BASE")]
    exhibitor: Option<String>,

    /// Property template
    #[arg(long)]
    template: Option<PathBuf>,

    /// Rendered properties path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Server start command
    #[arg(long)]
    command: Option<PathBuf>,

    /// Lock namespace, e.g. "kafka"
    #[arg(long)]
    service: Option<String>,

    /// Time between ensemble checks (e.g. "60s")
    #[arg(long, value_parser = duration_arg)]
    poll_interval: Option<Duration>,

    /// Pause after a restart before releasing the lock
    #[arg(long, value_parser = duration_arg)]
    settle_interval: Option<Duration>,

    /// Give up on the restart lock after this long
    #[arg(long, value_parser = duration_arg)]
    lock_timeout: Option<Duration>,

    /// SIGKILL the server this long after SIGTERM
    #[arg(long, value_parser = duration_arg)]
    stop_timeout: Option<Duration>,

    /// Stop after this many loop iterations
    #[arg(long)]
    iterations: Option<u64>,
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

impl Cli {
    /// CLI has priority over file and environment
    fn apply(self, config: &mut SupervisorConfig) {
        if let Some(v) = self.exhibitor {
            config.exhibitor_base = Some(v);
        }
        if let Some(v) = self.template {
            config.template_path = v;
        }
        if let Some(v) = self.output {
            config.output_path = v;
        }
        if let Some(v) = self.command {
            config.command = v;
        }
        if let Some(v) = self.service {
            config.service_name = v;
        }
        if let Some(v) = self.poll_interval {
            config.poll_interval = v;
        }
        if let Some(v) = self.settle_interval {
            config.settle_interval = v;
        }
        if self.lock_timeout.is_some() {
            config.lock_timeout = self.lock_timeout;
        }
        if self.stop_timeout.is_some() {
            config.stop_timeout = self.stop_timeout;
        }
        if self.iterations.is_some() {
            config.iterations = self.iterations;
        }
    }
}

fn main() {
    std::process::exit(run());
}

#[tokio::main]
async fn run() -> i32 {
    let cli = Cli::parse();

    let loaded = SupervisorConfig::load(cli.config.as_deref());
    let log_level = loaded
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return EXIT_CONFIG_MISSING;
        }
    };
    cli.apply(&mut config);
    let shutdown = shutdown_signal();

    match supervise(config, shutdown).await {
        Ok(code) => {
            tracing::info!("Supervisor exiting with {}", code);
            code
        }
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    }
}

async fn supervise(
    config: SupervisorConfig,
    shutdown: impl Future<Output = ()>,
) -> ensemble_supervisor::Result<i32> {
    let exhibitor = config.exhibitor_base()?;

    tracing::info!("Starting ensemble-supervisor {}", ensemble_supervisor::VERSION);
    tracing::info!("  Exhibitor: {}", exhibitor);
    tracing::info!("  Template: {}", config.template_path.display());
    tracing::info!("  Command: {}", config.command.display());
    tracing::info!("  Restart lock: {}", config.lock_path()?);

    let mut defaults =
        render::kafka_defaults(&std::env::var(ADVERTISED_HOST_ENV).unwrap_or_default());
    defaults.extend(config.properties.clone());
    let properties =
        ResolvedProperties::load(&config.template_path, render::env_overrides, &defaults)?;

    let discovery = ExhibitorDiscovery::new(exhibitor, config.discovery_timeout)?;
    let supervisor = ChildSupervisor::from_config(&config);
    let coordinator = RestartCoordinator::from_config(
        ZooKeeperCoordination::new(config.connect_timeout),
        &config,
    )?;

    let mut control = ControlLoop::new(
        discovery,
        supervisor,
        coordinator,
        properties,
        LoopSettings::from(&config),
    );
    control.run_until(shutdown).await
}

/// Installs the SIGINT and SIGTERM handlers immediately; the returned future
/// resolves on the first of them.
fn shutdown_signal() -> impl Future<Output = ()> {
    let interrupt = install_handler(SignalKind::interrupt(), "SIGINT");
    let terminate = install_handler(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            _ = received(interrupt) => tracing::info!("Received SIGINT"),
            _ = received(terminate) => tracing::info!("Received SIGTERM"),
        }
    }
}

fn install_handler(kind: SignalKind, name: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(handler) => Some(handler),
        Err(e) => {
            tracing::warn!("Failed to install {} handler: {}", name, e);
            None
        }
    }
}

async fn received(handler: Option<Signal>) {
    match handler {
        Some(mut handler) => {
            handler.recv().await;
        }
        None => std::future::pending().await,
    }
}

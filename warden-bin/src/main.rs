//! Warden daemon entry point: loads config, wires the governance core,
//! spawns workers and the reconciliation loop, and serves the HTTP API.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use warden_config::{ConfigLoader, WardenConfig};
use warden_core::Result as WardenResult;
use warden_governance::{ExecutorKind, GovernanceService};
use warden_ledger::LedgerStore;
use warden_proposal::{
    ActionExecutor, ExecutorSet, HttpCallout, ProposalExecutionHandler, ProposalService,
    UnconfiguredExecutor,
};
use warden_queue::{
    InMemoryBroker, Job, JobHandler, JobKind, QueueManager, Worker,
};
use warden_registry::{AgentDirectory, ContextResolver, InMemoryDirectory};

#[derive(Parser)]
#[command(name = "warden", version, about = "Agent action governance core")]
struct Cli {
    /// Path to warden.toml (default: ~/.warden/warden.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: workers, reconciliation, HTTP API
    Serve,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let loader = ConfigLoader::load(cli.config.as_deref())?;
    let config = loader.get();

    init_tracing(&config, cli.log_level.as_deref());

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Config => {
            println!(
                "{}",
                toml::to_string_pretty(&config).context("failed to render config")?
            );
            Ok(())
        }
    }
}

fn init_tracing(config: &WardenConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(&config.logging.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

async fn serve(config: WardenConfig) -> anyhow::Result<()> {
    // ── Component wiring: explicit instances, no globals ───────
    let directory = Arc::new(InMemoryDirectory::new());
    let governance = Arc::new(GovernanceService::new(
        directory.clone(),
        &config.governance,
    ));

    let ledger_path = config.ledger.path.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
            .join("ledger.db")
    });
    if let Some(parent) = ledger_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let ledger = Arc::new(LedgerStore::open(&ledger_path)?);

    let broker = Arc::new(InMemoryBroker::new(Duration::from_secs(
        config.queue.lease_ttl_secs,
    )));
    let manager = Arc::new(QueueManager::new(broker.clone(), ledger.clone()));

    let executors = Arc::new(ExecutorSet::new(
        callout(ExecutorKind::Browser, config.executors.browser_url.as_deref()),
        callout(
            ExecutorKind::Integration,
            config.executors.integration_url.as_deref(),
        ),
        callout(ExecutorKind::Workflow, config.executors.workflow_url.as_deref()),
        callout(ExecutorKind::Agent, config.executors.agent_url.as_deref()),
    ));
    let proposals = Arc::new(ProposalService::new(
        governance.clone(),
        ledger.clone(),
        executors,
    ));

    // ── Workers ────────────────────────────────────────────────
    let poll_interval = Duration::from_secs(config.queue.poll_interval_secs);
    for n in 0..config.queue.workers {
        let worker = Arc::new(
            Worker::new(broker.clone(), ledger.clone(), poll_interval)
                .register(
                    JobKind::ProposalExecution,
                    Arc::new(ProposalExecutionHandler::new(proposals.clone())),
                )
                .register(
                    JobKind::AgentNotification,
                    Arc::new(NotificationHandler {
                        directory: directory.clone(),
                    }),
                )
                .register(
                    JobKind::LedgerReconciliation,
                    Arc::new(ReconciliationHandler {
                        ledger: ledger.clone(),
                        timeout: Duration::from_secs(config.ledger.stale_execution_timeout_secs),
                    }),
                ),
        );
        info!(worker = n, "spawning worker");
        tokio::spawn(worker.run());
    }

    // ── Recurring schedule poller ──────────────────────────────
    {
        let manager = manager.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;
                if let Err(e) = manager.poll_recurring(Utc::now()).await {
                    warn!(error = %e, "recurring poll failed");
                }
            }
        });
    }

    // ── Ledger reconciliation loop ─────────────────────────────
    // Runs in-process so crash recovery works even when the broker is
    // unreachable.
    {
        let ledger = ledger.clone();
        let interval = Duration::from_secs(config.ledger.reconcile_interval_secs);
        let timeout = Duration::from_secs(config.ledger.stale_execution_timeout_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match ledger.reconcile_stale(timeout) {
                    Ok(repaired) if !repaired.is_empty() => {
                        warn!(count = repaired.len(), "reconciliation repaired stale executions");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "reconciliation pass failed"),
                }
            }
        });
    }

    // ── HTTP API ───────────────────────────────────────────────
    let resolver = Arc::new(ContextResolver::new(directory.clone()));
    let router = warden_server::build_router(
        &config.server,
        manager,
        governance,
        resolver,
        ledger.clone(),
    );
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(listen = %config.server.listen, "warden listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn callout(kind: ExecutorKind, url: Option<&str>) -> Arc<dyn ActionExecutor> {
    match url {
        Some(url) => Arc::new(HttpCallout::new(kind, url)),
        None => {
            warn!(executor = %kind, "no endpoint configured — dispatches to this executor will fail");
            Arc::new(UnconfiguredExecutor::new(kind))
        }
    }
}

/// Delivers notification jobs to the agent's workspace. The transport is a
/// collaborator; this handler resolves the target and hands off.
struct NotificationHandler {
    directory: Arc<InMemoryDirectory>,
}

#[async_trait]
impl JobHandler for NotificationHandler {
    async fn handle(&self, job: &Job) -> WardenResult<serde_json::Value> {
        let agent_id = job
            .payload
            .get("agent_id")
            .and_then(|v| v.as_str())
            .unwrap_or(&job.user_id);
        // The context map's workspace_id override wins for notifications.
        let workspace = match self.directory.get(agent_id).await? {
            Some(agent) => agent.notification_workspace().to_string(),
            None => job
                .payload
                .get("workspace_id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        };
        info!(job_id = %job.id, %workspace, "delivering notification");
        Ok(serde_json::json!({ "delivered_to": workspace }))
    }
}

/// On-demand reconciliation sweep, enqueueable as a job.
struct ReconciliationHandler {
    ledger: Arc<LedgerStore>,
    timeout: Duration,
}

#[async_trait]
impl JobHandler for ReconciliationHandler {
    async fn handle(&self, _job: &Job) -> WardenResult<serde_json::Value> {
        let repaired = self.ledger.reconcile_stale(self.timeout)?;
        Ok(serde_json::json!({ "repaired": repaired }))
    }
}

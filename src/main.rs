use std::process::Stdio;
use std::sync::Arc;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use jobmill::cluster::{NodeId, SystemResources};
use jobmill::config::SchedulerConfig;
use jobmill::dispatcher::Dispatcher;
use jobmill::error::JobError;
use jobmill::lock::LocalLockService;
use jobmill::queue::JobStore;
use jobmill::reconciler::Reconciler;
use jobmill::registry::Registry;
use jobmill::shutdown::install_shutdown_handler;
use jobmill::worker::WorkerPool;

#[derive(Parser, Debug)]
#[command(name = "jobmill")]
#[command(version)]
#[command(about = "Cluster-aware job queue and worker scheduler")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a single-node scheduler
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Node name reported in worker records
    #[arg(long, default_value = "local")]
    node: String,

    /// Dispatcher poll interval in milliseconds
    #[arg(long, default_value = "1000")]
    poll_interval: u64,

    /// Reconciler sweep interval in milliseconds
    #[arg(long, default_value = "60000")]
    sweep_interval: u64,

    /// Maximum concurrent workers on this node
    #[arg(long, default_value = "4")]
    max_workers: usize,

    /// CPU load-average ceiling for admitting new jobs
    #[arg(long, default_value = "3.0")]
    max_cpu_load: f64,

    /// Used-memory percentage ceiling for admitting new jobs
    #[arg(long, default_value = "85.0")]
    max_memory: f64,

    /// Queue definitions, format "name:priority[:shared]"
    /// (queues dedup identical jobs unless marked shared)
    #[arg(long = "queue", default_value = "default:1")]
    queues: Vec<String>,

    /// Shell commands pushed to the first queue at start-up
    #[arg(long = "exec")]
    commands: Vec<String>,
}

#[derive(Debug, Clone)]
struct QueueSpec {
    name: String,
    priority: i32,
    unique_jobs: bool,
}

fn parse_queue_spec(spec: &str) -> Result<QueueSpec, String> {
    let mut parts = spec.splitn(3, ':');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("empty queue name in {spec:?}"))?;
    let priority = match parts.next() {
        Some(p) => p
            .parse::<i32>()
            .map_err(|_| format!("bad priority in {spec:?}"))?,
        None => 1,
    };
    let unique_jobs = match parts.next() {
        Some("shared") => false,
        Some("unique") | None => true,
        Some(other) => return Err(format!("bad queue flag {other:?} in {spec:?}")),
    };
    Ok(QueueSpec {
        name: name.to_string(),
        priority,
        unique_jobs,
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct ShellCommandArgs {
    command: String,
}

/// Demo job type: run a shell command and fail on non-zero exit.
async fn run_shell_command(args: ShellCommandArgs) -> jobmill::Result<()> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(&args.command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| JobError::JobFailed(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
        tracing::info!(command = %args.command, output = %stdout.trim_end(), "Command output");
    }

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(JobError::JobFailed(if stderr.is_empty() {
            format!("exit code: {:?}", output.status.code())
        } else {
            stderr
        }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Run(run_args) => run(run_args).await,
    }
}

async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let specs: Vec<QueueSpec> = args
        .queues
        .iter()
        .map(|s| parse_queue_spec(s))
        .collect::<Result<_, _>>()?;

    let mut builder = Registry::builder().job_type(
        "shell_command",
        "Shell command",
        run_shell_command,
    )?;
    for spec in &specs {
        builder = builder.queue(&spec.name, &spec.name, spec.priority, spec.unique_jobs)?;
    }
    let registry = Arc::new(builder.build());

    let store = JobStore::shared();
    store.write().await.register_queues(&registry);

    let node = NodeId::new(args.node);
    let locks = Arc::new(LocalLockService::new());
    let resources = Arc::new(SystemResources::new());
    let config = SchedulerConfig::new(args.poll_interval, args.sweep_interval)
        .with_max_workers(args.max_workers)
        .with_cpu_ceiling(args.max_cpu_load)
        .with_memory_ceiling(args.max_memory);

    let pool = WorkerPool::new(node.clone(), store.clone(), registry.clone());
    let dispatcher = Dispatcher::new(
        node.clone(),
        store.clone(),
        pool.clone(),
        locks.clone(),
        resources,
        config.clone(),
    );
    let reconciler = Reconciler::new(store.clone(), locks, config.sweep_interval_ms);

    // Seed the first queue with any requested commands.
    if let Some(first) = specs.first() {
        let mut guard = store.write().await;
        for command in &args.commands {
            match guard.push(
                &registry,
                &first.name,
                "shell_command",
                serde_json::json!({ "command": command }),
            ) {
                Ok(item) => tracing::info!(queue = %first.name, item = %item, "Job queued"),
                Err(e) => tracing::warn!(command = %command, error = %e, "Push rejected"),
            }
        }
    }

    let token = install_shutdown_handler();
    // Membership events would come from a cluster layer; single-node runs
    // only sweep.
    let (_event_tx, event_rx) = mpsc::channel(16);

    let dispatcher_token = token.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_token).await;
    });
    let reconciler_token = token.clone();
    let reconciler_handle = tokio::spawn(async move {
        reconciler.run(reconciler_token, event_rx).await;
    });

    tracing::info!(node = %node, "jobmill running, press Ctrl-C to stop");
    token.cancelled().await;

    dispatcher_handle.await?;
    reconciler_handle.await?;
    Ok(())
}

mod config;
mod demo;

use crate::config::ConclaveConfig;
use clap::{Parser, Subcommand, ValueEnum};
use conclave_orchestrator::Engine;
use conclave_policy::{AuditedGate, PolicyAudit};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conclave", about = "Conclave — capability-based task orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conclave.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the configured workers, submit the tasks and run the engine
    Run {
        /// How long to run, in seconds
        #[arg(short, long, default_value_t = 10)]
        duration: u64,
        /// Write the final state here (overrides config)
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Validate the config and evaluate every worker and task against the policy
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = ConclaveConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Run { duration, export } => run(config, duration, export).await,
        Commands::Check => check(config).await,
    }
}

fn build_engine(config: &ConclaveConfig) -> anyhow::Result<Engine> {
    let audit = Arc::new(PolicyAudit::new());
    let gate = AuditedGate::with_audit(config.rule_policy(), audit.clone());
    Ok(Engine::new(config.engine.clone(), Arc::new(gate))?.with_policy_audit(audit))
}

async fn run(
    mut config: ConclaveConfig,
    duration: u64,
    export: Option<PathBuf>,
) -> anyhow::Result<()> {
    if export.is_some() {
        config.engine.export_path = export;
    }
    let engine = build_engine(&config)?;

    for entry in &config.workers {
        match engine
            .register_worker(entry.id.clone(), entry.build(), entry.worker_config())
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_policy_violation() => {
                warn!(worker_id = %entry.id, error = %e, "Skipping worker");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for entry in &config.tasks {
        match engine.submit(entry.to_task()).await {
            Ok(_) => {}
            Err(e) if e.is_policy_violation() => {
                warn!(task = %entry.description, error = %e, "Skipping task");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for (task, dep) in config.unknown_dependencies() {
        warn!(task = %task, dependency = %dep, "Dependency names no configured task");
    }

    info!(
        workers = config.workers.len(),
        tasks = config.tasks.len(),
        duration_secs = duration,
        "Starting run"
    );
    let stats = engine.run_for(Duration::from_secs(duration)).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn check(config: ConclaveConfig) -> anyhow::Result<()> {
    let engine = build_engine(&config)?;
    let mut rejected = 0usize;

    println!("Workers:");
    for entry in &config.workers {
        let worker_config = entry.worker_config();
        let caps = worker_config.capabilities.to_string();
        match engine
            .register_worker(entry.id.clone(), entry.build(), worker_config)
            .await
        {
            Ok(_) => println!("  ok        {} {}", entry.id, caps),
            Err(e) => {
                rejected += 1;
                println!("  rejected  {} ({e})", entry.id);
            }
        }
    }

    println!("Tasks:");
    for entry in &config.tasks {
        let task = entry.to_task();
        let id = task.id.clone();
        match engine.submit(task).await {
            Ok(_) => println!("  ok        {id} {}", entry.description),
            Err(e) => {
                rejected += 1;
                println!("  rejected  {id} ({e})");
            }
        }
    }

    let unknown = config.unknown_dependencies();
    if !unknown.is_empty() {
        println!("Unresolvable dependencies:");
        for (task, dep) in &unknown {
            println!("  {task} -> {dep}");
        }
    }

    if let Some(policy) = engine.stats().await.policy {
        println!(
            "\nPolicy: {} decision(s), {} prevented, compliance {:.0}%",
            policy.total_decisions,
            policy.violations_prevented,
            policy.compliance_rate * 100.0
        );
    }

    if rejected > 0 {
        anyhow::bail!("{rejected} entr{} rejected", if rejected == 1 { "y" } else { "ies" });
    }
    Ok(())
}

//! podwright - provisions isolated step-execution pods on Kubernetes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::Client;
use tracing::info;

use podwright::common::telemetry::{init_tracing, TelemetryConfig};
use podwright::common::{ControllerConfig, UnitSpec};
use podwright::controller::{
    Base64Decryptor, EventWatcher, KubeClusterClient, Orchestrator, Outcome, TracingLogSink,
};

/// podwright - provision and reclaim execution-unit pods
#[derive(Parser, Debug)]
#[command(name = "podwright", version, about, long_about = None)]
struct Cli {
    /// Controller configuration file (YAML); defaults apply when omitted
    #[arg(short = 'c', long, env = "PODWRIGHT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision secrets, the control service and the pod for a unit
    Init(UnitArgs),

    /// Delete every pod, secret and service of a unit
    Cleanup {
        /// Execution unit id
        #[arg(long)]
        unit_id: String,
    },

    /// Print the pod and service `init` would submit, without a cluster
    Render(UnitArgs),

    /// Stream the unit pod's events to the log until Ctrl-C
    Watch {
        /// Execution unit id
        #[arg(long)]
        unit_id: String,
    },
}

#[derive(Parser, Debug)]
struct UnitArgs {
    /// Execution unit id
    #[arg(long)]
    unit_id: String,

    /// Unit declaration file (YAML or JSON)
    #[arg(short = 'f', long)]
    spec: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(TelemetryConfig::default())?;

    let cli = Cli::parse();
    let config = Arc::new(
        ControllerConfig::load(cli.config.as_deref()).context("loading controller config")?,
    );

    match cli.command {
        Commands::Init(args) => run_init(config, args).await,
        Commands::Cleanup { unit_id } => run_cleanup(config, &unit_id).await,
        Commands::Render(args) => run_render(config, args),
        Commands::Watch { unit_id } => run_watch(config, &unit_id).await,
    }
}

fn read_unit(path: &Path) -> anyhow::Result<UnitSpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading unit declaration {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing unit declaration {}", path.display()))
}

async fn orchestrator(config: Arc<ControllerConfig>) -> anyhow::Result<Orchestrator> {
    let client = Client::try_default()
        .await
        .context("connecting to the Kubernetes API")?;
    Ok(Orchestrator::new(
        Arc::new(KubeClusterClient::new(client)),
        Arc::new(Base64Decryptor),
        config,
    ))
}

async fn run_init(config: Arc<ControllerConfig>, args: UnitArgs) -> anyhow::Result<()> {
    let unit = read_unit(&args.spec)?;
    let orchestrator = orchestrator(config).await?;

    match orchestrator.init(&args.unit_id, &unit).await? {
        Outcome::Completed(report) => {
            println!(
                "unit {} initialized: pod {}, service {}, {} secrets",
                args.unit_id,
                report.pod,
                report.service,
                report.secrets.count()
            );
            Ok(())
        }
        Outcome::Abandoned { stage, error } => {
            anyhow::bail!(
                "init of {} abandoned at {stage}: {error}; run `podwright cleanup --unit-id {}`",
                args.unit_id,
                args.unit_id
            )
        }
    }
}

async fn run_cleanup(config: Arc<ControllerConfig>, unit_id: &str) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config).await?;

    match orchestrator.cleanup(unit_id).await? {
        Outcome::Completed(report) => {
            println!(
                "unit {unit_id} cleaned up: {} pods, {} secrets, {} services deleted ({} failed)",
                report.pods.deleted,
                report.secrets.deleted,
                report.services.deleted,
                report.total_failed()
            );
            Ok(())
        }
        Outcome::Abandoned { stage, error } => {
            anyhow::bail!("cleanup of {unit_id} abandoned at {stage}: {error}")
        }
    }
}

fn run_render(config: Arc<ControllerConfig>, args: UnitArgs) -> anyhow::Result<()> {
    let unit = read_unit(&args.spec)?;
    let plan = podwright::controller::render(&config, &args.unit_id, &unit)?;

    println!("{}", serde_yaml::to_string(&plan.service)?);
    println!("---");
    println!("{}", serde_yaml::to_string(&plan.pod)?);
    Ok(())
}

async fn run_watch(config: Arc<ControllerConfig>, unit_id: &str) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .context("connecting to the Kubernetes API")?;
    let watcher = EventWatcher::new(
        Arc::new(KubeClusterClient::new(client)),
        Arc::new(TracingLogSink),
        config,
    );

    let handle = watcher.start(unit_id);
    let token = handle.cancellation_token();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(unit = %unit_id, "interrupt received, stopping watch");
            handle.stop().await;
        }
        _ = token.cancelled() => {}
    }
    Ok(())
}

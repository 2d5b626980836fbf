//! hookcron: recurring-task reconciliation CLI
//!
//! Subcommands:
//! - `check`: reconcile a manifest against a fresh engine and report its state
//! - `run`: reconcile a manifest and fire tasks until interrupted

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use miette::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hookcron_scheduler::{MemoryEngine, Scheduler};

mod manifest;

use manifest::Manifest;

#[derive(Parser)]
#[command(name = "hookcron")]
#[command(about = "Recurring-task registry and scheduler reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a manifest's tasks and print their pending state
    Check {
        /// Task manifest (JSON)
        #[arg(long, env = "HOOKCRON_MANIFEST")]
        manifest: PathBuf,

        /// Override the manifest's hook prefix
        #[arg(long, env = "HOOKCRON_PREFIX")]
        prefix: Option<String>,

        /// Also schedule tasks whose condition declines them
        #[arg(long)]
        missed: bool,
    },

    /// Schedule a manifest's tasks and fire them until Ctrl-C
    Run {
        /// Task manifest (JSON)
        #[arg(long, env = "HOOKCRON_MANIFEST")]
        manifest: PathBuf,

        /// Override the manifest's hook prefix
        #[arg(long, env = "HOOKCRON_PREFIX")]
        prefix: Option<String>,

        /// Fire whatever is due once and exit
        #[arg(long)]
        once: bool,
    },
}

async fn load(manifest: PathBuf, prefix: Option<String>) -> Result<Scheduler<MemoryEngine>> {
    let mut manifest = Manifest::load(&manifest)?;
    if let Some(prefix) = prefix {
        manifest.config.prefix = prefix;
    }
    manifest.into_scheduler().await
}

async fn check(scheduler: &Scheduler<MemoryEngine>, missed: bool) -> Result<()> {
    let created = if missed {
        scheduler.schedule_missed().await
    } else {
        scheduler.schedule_all().await
    }
    .map_err(|e| miette::miette!("{}", e))?;
    info!(created, "reconciled manifest");

    for def in scheduler.registry().iter() {
        let next = scheduler
            .next_run(&def.name)
            .await
            .map_err(|e| miette::miette!("{}", e))?;
        let next = next.map_or_else(|| "unscheduled".to_string(), |at| at.to_rfc3339());
        println!("{:<32} {:<12} {}", def.hook, def.recurrence, next);
    }

    let partition = scheduler
        .partition()
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    println!(
        "\n{} scheduled, {} unscheduled",
        partition.scheduled.len(),
        partition.unscheduled.len()
    );
    Ok(())
}

async fn run(scheduler: Scheduler<MemoryEngine>, once: bool) -> Result<()> {
    scheduler
        .schedule_all()
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let engine: Arc<MemoryEngine> = scheduler.engine().clone();

    if once {
        let fired = engine.run_due(Utc::now()).await;
        for f in &fired {
            println!(
                "{} fired at {} (next: {})",
                f.hook,
                f.at.to_rfc3339(),
                f.next.map_or_else(|| "none".to_string(), |at| at.to_rfc3339())
            );
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(shutdown_rx).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "hookcron=info,hookcron_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            manifest,
            prefix,
            missed,
        } => {
            let scheduler = load(manifest, prefix).await?;
            check(&scheduler, missed).await
        }
        Commands::Run {
            manifest,
            prefix,
            once,
        } => {
            let scheduler = load(manifest, prefix).await?;
            run(scheduler, once).await
        }
    }
}

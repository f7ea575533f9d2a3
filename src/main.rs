use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use wipr::config::AppConfig;
use wipr::context::AppContext;
use wipr::core::progress::{WipeEvent, WipeOutcome, format_bytes};
use wipr::logging::{self, LogConfig};

#[derive(Parser)]
#[command(name = "wipr")]
#[command(about = "Drive discovery and destructive data removal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    simulation: Option<bool>,

    #[arg(long, global = true)]
    verbose: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered disks and their partitions
    Catalog(CatalogArgs),
    /// Start a destructive run over a disk or a single partition
    Wipe(WipeArgs),
}

#[derive(Args)]
struct CatalogArgs {
    /// Emit rows as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct WipeArgs {
    /// Disk id ("d0") or partition key ("d0p1", or the legacy "name model")
    #[arg(long)]
    target: String,

    /// Override the per-file pacing delay in milliseconds
    #[arg(long)]
    file_pace_ms: Option<u64>,
}

#[derive(Serialize)]
struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    simulation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wipe_file_pace_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogRow {
    id: String,
    model: String,
    size_bytes: u64,
    mount_point: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        simulation: cli.simulation,
        verbose: cli.verbose,
        wipe_file_pace_ms: match &cli.command {
            Commands::Wipe(args) => args.file_pace_ms,
            _ => None,
        },
    };
    let config = AppConfig::new(Some(&overrides))?;
    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    });

    let ctx = AppContext::new(config);
    match &cli.command {
        Commands::Catalog(args) => run_catalog(&ctx, args.json)?,
        Commands::Wipe(args) => {
            let code = run_wipe(&ctx, &args.target).await?;
            std::process::exit(code);
        }
    }

    Ok(())
}

fn run_catalog(ctx: &AppContext, json: bool) -> Result<()> {
    let snapshot = ctx.catalog.refresh().context("Catalog refresh failed")?;

    let mut rows = Vec::new();
    for disk in snapshot.disks() {
        rows.push(CatalogRow {
            id: disk.id.clone(),
            model: disk.model.clone(),
            size_bytes: disk.size_bytes,
            mount_point: None,
        });
        for partition in &disk.partitions {
            rows.push(CatalogRow {
                id: partition.id.clone(),
                model: disk.model.clone(),
                size_bytes: partition.size_bytes,
                mount_point: partition
                    .mount_point
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            println!(
                "{:<8} {:<32} {:>10}  {}",
                row.id,
                row.model,
                format_bytes(row.size_bytes),
                row.mount_point.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn run_wipe(ctx: &AppContext, target: &str) -> Result<i32> {
    ctx.catalog.refresh().context("Catalog refresh failed")?;
    let targets = ctx.catalog.resolve_targets(target)?;

    let (tx, mut rx) = mpsc::channel(64);
    ctx.orchestrator.start(targets, tx)?;

    let mut code = 1;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(WipeEvent::Progress(progress)) => {
                    println!(
                        "[{}/{}] {} / {} ({:.2}%)  {}",
                        progress.partition_index,
                        progress.partition_count,
                        format_bytes(progress.accumulated_bytes),
                        format_bytes(progress.total_used_bytes),
                        progress.fraction_complete * 100.0,
                        progress.current_path,
                    );
                }
                Some(WipeEvent::Finished(outcome)) => {
                    match &outcome {
                        WipeOutcome::Completed => println!("Wipe complete!"),
                        WipeOutcome::Cancelled => println!("Wipe operation was cancelled."),
                        WipeOutcome::Failed(message) => eprintln!("Wipe failed: {message}"),
                    }
                    code = outcome.exit_code();
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelling at the next file boundary...");
                let _ = ctx.orchestrator.cancel();
            }
        }
    }

    let _ = ctx.orchestrator.acknowledge();
    Ok(code)
}

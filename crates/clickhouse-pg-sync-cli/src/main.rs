//! clickhouse-pg-sync CLI - batched ClickHouse to PostgreSQL replication.

use clap::{Parser, Subcommand};
use clickhouse_pg_sync::error::{EXIT_CANCELLED, EXIT_TRANSFER_ERROR};
use clickhouse_pg_sync::{Config, Orchestrator, RunReport, SyncError};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "clickhouse-pg-sync")]
#[command(about = "Batched ClickHouse to PostgreSQL table replication")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate the configured tables
    Run {
        /// Only replicate the table with this source (or destination) name
        #[arg(long)]
        only: Option<String>,

        /// Override number of load/merge workers
        #[arg(long)]
        workers: Option<usize>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Do not write advanced cursors back to the configuration file
        #[arg(long)]
        no_save: bool,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    // Cursors are saved back into this copy; auto-tuned values stay out of the file.
    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            only,
            workers,
            batch_size,
            no_save,
        } => {
            let mut tuned = config.clone();
            if let Some(w) = workers {
                tuned.pipeline.workers = Some(w);
            }
            if let Some(b) = batch_size {
                tuned.batch_size = Some(b);
            }
            tuned.validate()?;
            let tuned = tuned.with_auto_tuning();

            let cancel_token = setup_signal_handler();
            let orchestrator = Orchestrator::new(tuned).await?;
            let report = orchestrator
                .run(&mut config.tables, only.as_deref(), &cancel_token)
                .await?;

            if no_save {
                info!("Not saving cursors (--no-save)");
            } else if report.tables_done > 0 {
                config.save(&cli.config)?;
                info!("Saved cursors to {:?}", cli.config);
            }

            print_report(&report, cli.output_json)?;

            if report.cancelled {
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
            if report.tables_failed > 0 {
                error!("Failed tables: {:?}", report.failed_tables());
                return Ok(ExitCode::from(EXIT_TRANSFER_ERROR));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (ClickHouse): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(SyncError::Config("Health check failed".to_string()));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RunReport, json: bool) -> Result<(), SyncError> {
    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    let status = if report.cancelled {
        "Replication cancelled"
    } else if report.tables_failed > 0 {
        "Replication completed with failures"
    } else {
        "Replication completed!"
    };
    println!("\n{}", status);
    println!("  Duration: {:.2}s", report.duration_ms as f64 / 1000.0);
    println!(
        "  Tables: {} done, {} failed, {} skipped",
        report.tables_done, report.tables_failed, report.tables_skipped
    );
    println!(
        "  Rows: {} extracted, {} merged",
        report.rows_extracted, report.rows_merged
    );
    if report.failed_batches > 0 {
        println!("  Dropped batches: {}", report.failed_batches);
    }
    for table in &report.tables {
        if let Some(ref err) = table.error {
            println!("  {} failed: {}", table.source, err);
        }
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Cancelling in-flight work...", name);
                    token.cancel();
                });
            }
            Err(e) => warn!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Cancel the returned token on Ctrl-C (Windows).
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Cancelling in-flight work...");
            token.cancel();
        }
    });

    cancel_token
}

//! sqlite-pg-migrate CLI - movies catalog migration from SQLite to PostgreSQL.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{Config, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "Movies catalog migration from SQLite to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (environment and .env are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

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
    /// Truncate the destination and copy every entity type
    Run {
        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Dry run: count source rows without touching the destination
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate row counts between source and target
    Validate,

    /// Verify row content between source and target, ordered by id
    Verify {
        /// Override rows fetched per comparison page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let config = Config::from_env()?;
            info!("Loaded configuration from environment");
            config
        }
    };

    match cli.command {
        Commands::Run {
            batch_size,
            dry_run,
        } => {
            // Apply overrides
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
                config.validate()?;
            }

            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.run(dry_run).await;
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if dry_run { "Dry run completed!" } else { "Migration completed!" };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                for entity in &result.entities {
                    println!(
                        "  {:<12} {:>10} rows in {} batches",
                        entity.entity.to_string(),
                        entity.rows_read,
                        entity.batches
                    );
                }
                println!("  Rows: {}", result.rows_read);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::new(config).await?;
            let checks = orchestrator.validate().await;
            orchestrator.close().await;
            let checks = checks?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                println!("\nValidation Results:");
                for check in &checks {
                    let status = if check.matches { "OK" } else { "MISMATCH" };
                    println!(
                        "  {:<12} source={:>10} target={:>10} {}",
                        check.entity.to_string(),
                        check.source_rows,
                        check.target_rows,
                        status
                    );
                }
            }

            if let Some(check) = checks.iter().find(|c| !c.matches) {
                return Err(check.into());
            }
        }

        Commands::Verify { page_size } => {
            if let Some(size) = page_size {
                config.verify.page_size = size;
                config.validate()?;
            }
            let page_size = config.verify.page_size;

            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.verify(page_size).await;
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nVerification Results:");
                for table in &result.tables {
                    match &table.discrepancy {
                        None => println!(
                            "  {:<12} OK ({} rows compared)",
                            table.entity.to_string(),
                            table.rows_compared
                        ),
                        Some(d) => println!("  {:<12} {}", table.entity.to_string(), d),
                    }
                }
                println!(
                    "\n  In sync: {}, with differences: {} ({}ms)",
                    result.tables_in_sync, result.tables_with_differences, result.duration_ms
                );
            }

            if let Some(err) = result.first_error() {
                return Err(err);
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (SQLite): {} ({}ms)",
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
                let store = if result.source_connected { "target" } else { "source" };
                return Err(MigrateError::connection(store, "health check failed"));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays machine-readable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

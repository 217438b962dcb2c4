use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dbroute::config::Config;
use dbroute::utils::format_age;
use dbroute::RouterService;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dbroute")]
#[command(about = "A health-aware read/write router for primary/replica database endpoints")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "dbroute team")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the router with background health checking
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config/dev.toml")]
        config: PathBuf,
    },
    /// Generate an example configuration file
    Config {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Probe every configured endpoint once and print its health
    Probe {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_router(config).await,
        Commands::Config { output } => generate_config(output),
        Commands::Validate { config } => validate_config(config),
        Commands::Probe { config } => probe_endpoints(config).await,
        Commands::Version => {
            show_version();
            Ok(())
        }
    }
}

async fn run_router(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config)?;

    info!("Starting dbroute v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {:?}", config_path);

    let mut service = RouterService::new(config).context("Failed to build router")?;
    service.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    let stats = service.router().stats();
    info!(
        reads = stats.reads,
        writes = stats.writes,
        fallbacks = stats.fallbacks,
        failures = stats.failures,
        "Final routing statistics"
    );
    service.shutdown().await;

    Ok(())
}

fn generate_config(output: PathBuf) -> anyhow::Result<()> {
    println!("Generating configuration file: {:?}", output);

    Config::create_example_config(&output).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  dbroute run --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!("  Selection policy: {:?}", config.routing.policy);
            println!(
                "  Health: every {}s, timeout {}s, unhealthy after {} failures",
                config.health.interval_sec, config.health.timeout_sec, config.health.failure_threshold
            );
            println!(
                "  Connections: connect timeout {}ms",
                config.connections.connect_timeout_ms
            );
            if let Some(writer) = config.writer() {
                println!("  Writer: {} ({}, pool {})", writer.id, writer.address, writer.pool_size);
            }
            for (i, reader) in config.readers().enumerate() {
                println!(
                    "  Reader {}: {} ({}, pool {})",
                    i + 1,
                    reader.id,
                    reader.address,
                    reader.pool_size
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            eprintln!("  {}", e);
            bail!(e)
        }
    }
}

async fn probe_endpoints(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let service = RouterService::new(config)?;
    let reports = service.probe_once().await;

    println!("{:<20} {:<8} {:<10} {:<12} RESULT", "ENDPOINT", "ROLE", "STATUS", "CHECKED");
    for snapshot in service.router().snapshot() {
        let result = reports
            .iter()
            .find(|r| r.endpoint_id == snapshot.id)
            .map(|r| match &r.result {
                Ok(()) => "ok".to_string(),
                Err(failure) => failure.to_string(),
            })
            .unwrap_or_default();
        println!(
            "{:<20} {:<8} {:<10} {:<12} {}",
            snapshot.id,
            snapshot.role.to_string(),
            snapshot.status.to_string(),
            format_age(snapshot.last_checked),
            result
        );
    }

    Ok(())
}

fn show_version() {
    println!("dbroute v{}", env!("CARGO_PKG_VERSION"));
    println!("A health-aware read/write router for primary/replica database endpoints");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Writes pinned to the single writer, fail-fast when it is down");
    println!("  • Reads balanced across healthy replicas (round-robin, LRU, least in-flight)");
    println!("  • Degraded mode: reads fall back to the writer when no replica is healthy");
    println!("  • Background health probing with consecutive-failure threshold");
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized at level: {} ({})",
        config.logging.level, config.logging.format
    );
    Ok(())
}

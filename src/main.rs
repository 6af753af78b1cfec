//! Consul discovery REST service entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use consul_discovery::api::{create_router, AppState};
use consul_discovery::config::Config;
use consul_discovery::discovery::DiscoveryService;
use consul_discovery::error::AppError;
use consul_discovery::metrics;
use consul_discovery::registry::{ConsulRegistryClient, RegistryClient};
use consul_discovery::runtime::StartedAt;
use consul_discovery::utils::shutdown_signal;

/// REST facade over Consul service discovery.
#[derive(Parser, Debug)]
#[command(name = "consul-discovery")]
#[command(about = "REST endpoints for listing and inspecting services registered in Consul")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Run {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// List services registered in Consul.
    ListServices,

    /// Show the instances of one service.
    Instances {
        /// Service name.
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Configuration drives log format, so load it before logging starts
    let config = Config::load().map_err(AppError::from);
    let (verbose, json, level) = match &config {
        Ok(c) => (args.verbose || c.verbose, c.log_json, c.rust_log.clone()),
        Err(_) => (args.verbose, false, "info".to_string()),
    };

    init_tracing(verbose, json, &level);

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(config),
        Some(Command::ListServices) => cmd_list_services(config?).await,
        Some(Command::Instances { name }) => cmd_instances(config?, &name).await,
        Some(Command::Run { port }) => cmd_run(config?, port).await,
        None => cmd_run(config?, args.port).await,
    }
}

/// Initialize the tracing subscriber.
fn init_tracing(verbose: bool, json: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("consul_discovery=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Build the discovery facade against the configured Consul agent.
fn build_discovery(config: &Config) -> anyhow::Result<DiscoveryService> {
    let client: Arc<dyn RegistryClient> = Arc::new(ConsulRegistryClient::new(config)?);
    info!(registry = %client.describe(), "Registry client created");
    Ok(DiscoveryService::from_config(client, config))
}

/// Check configuration validity.
fn cmd_check_config(config: Result<Config, AppError>) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("CONSUL DISCOVERY - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match config {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Building Consul URL... ");
    match config.consul_base_url() {
        Ok(url) => println!("OK ({})", url),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Consul URL invalid"));
        }
    }

    let resilience = config.resilience();
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Application: {} {}", config.app_name, config.app_version);
    println!("  Profiles: {}", config.active_profiles().join(", "));
    println!("  Port: {}", config.port);
    println!("  ACL Token: {}", if config.consul_token.is_some() { "set" } else { "not set" });
    println!(
        "  Datacenter: {}",
        config.consul_datacenter.as_deref().unwrap_or("(agent default)")
    );
    println!("  Policy: {}", resilience.name);
    println!("    Retry: {} attempts, {}ms initial wait, x{} backoff",
        resilience.retry.max_attempts,
        resilience.retry.initial_delay_ms,
        resilience.retry.backoff_multiplier);
    println!("    Breaker: opens after {} failures for {:?}",
        resilience.breaker.failure_threshold,
        resilience.breaker.open_duration);
    println!("    Time limit: {:?}", resilience.timeout);
    println!("  Fallback services: {}", config.fallback_services.join(", "));
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// List services registered in Consul.
async fn cmd_list_services(config: Config) -> anyhow::Result<()> {
    config.validate().map_err(AppError::InvalidConfig)?;
    let discovery = build_discovery(&config)?;

    let services = discovery.list_services().await?;
    println!("{} services:", services.len());
    for name in services {
        println!("  {}", name);
    }

    Ok(())
}

/// Show the instances of one service.
async fn cmd_instances(config: Config, name: &str) -> anyhow::Result<()> {
    config.validate().map_err(AppError::InvalidConfig)?;
    let discovery = build_discovery(&config)?;

    let instances = discovery.get_service_instances(name).await?;
    println!("{} instances of '{}':", instances.len(), name);
    for instance in instances {
        println!(
            "  {:<30} {:<30} {}",
            instance.instance_id, instance.uri, instance.status
        );
    }

    Ok(())
}

/// Run the HTTP server.
async fn cmd_run(mut config: Config, port_override: Option<u16>) -> anyhow::Result<()> {
    let started_at = StartedAt::now();

    if let Some(port) = port_override {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(AppError::InvalidConfig(e).into());
    }

    info!(
        app = %config.app_name,
        version = %config.app_version,
        profiles = ?config.active_profiles(),
        "Configuration loaded successfully"
    );

    let prometheus = if config.metrics_enabled {
        metrics::install_prometheus()
    } else {
        None
    };

    let discovery = build_discovery(&config)?;
    let port = config.port;
    let app_state = AppState::new(config, discovery, started_at).with_prometheus(prometheus);
    let router = create_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

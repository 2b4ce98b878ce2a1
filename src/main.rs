//! provisiond - main entry point
//!
//! Parses the command line, sets up logging and either runs the HTTP API or
//! one of the offline helper commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use provisiond::api;
use provisiond::cli::{Cli, Commands, StatesFormat};
use provisiond::conductor::Conductor;
use provisiond::config::ServiceConfig;
use provisiond::fsm;
use provisiond::version::{ApiVersion, BASE_VERSION, VERSION_LOG};

/// Initialize tracing output; `RUST_LOG` overrides `default_level`.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves once Ctrl-C or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::load_from_file(path),
        None => Ok(ServiceConfig::default()),
    }
}

async fn serve(config_path: Option<PathBuf>, listen: Option<String>) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if let Some(listen) = listen {
        config.listen_addr = listen;
    }
    init_tracing(&config.log_level);
    config.validate().context("Invalid configuration")?;

    let conductor = Conductor::from_config(&config).context("Failed to set up conductor")?;
    info!(
        host = %config.host,
        drivers = ?config.enabled_drivers,
        automated_clean = config.automated_clean,
        "provisiond starting"
    );

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    api::serve(listener, conductor, shutdown_signal())
        .await
        .context("API server failed")?;
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    init_tracing("warn");
    let config = ServiceConfig::load_from_file(path)?;
    config.validate()?;
    println!("✓ Configuration file is valid: {}", path.display());
    Ok(())
}

fn print_versions() {
    println!(
        "Supported API versions: {} to {}",
        ApiVersion::MIN,
        ApiVersion::MAX
    );
    for (minor, change) in VERSION_LOG {
        println!("  {}.{:<3} {}", BASE_VERSION, minor, change);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Serve { config, listen } => serve(config, listen).await,
        Commands::Validate { config } => validate(&config),
        Commands::States { format } => {
            match format {
                StatesFormat::Table => print!("{}", fsm::render_table()),
                StatesFormat::Dot => print!("{}", fsm::render_dot()),
            }
            Ok(())
        }
        Commands::Versions => {
            print_versions();
            Ok(())
        }
    }
}

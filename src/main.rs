use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use tourocc::config::{Cli, Command, Config};
use tourocc::tenant::TenantManager;
use tourocc::{compactor, http, migrate, observability};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = observability::init_logging("info") {
        eprintln!("logging init failed: {e}");
    }

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::Migrate { input } => run_migrate(cli.config, &input).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "tourocc failed");
            ExitCode::FAILURE
        }
    }
}

fn open_tenants(config: &Config) -> Result<Arc<TenantManager>, BoxError> {
    let normalizer = config.normalizer()?;
    let tm = TenantManager::open(config.data_dir.clone(), config.compact_threshold, normalizer)?;
    Ok(Arc::new(tm))
}

async fn serve(config: Config) -> Result<(), BoxError> {
    observability::init_metrics(config.metrics_port)?;
    let tenant_manager = open_tenants(&config)?;

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("tourocc listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!(
        "  calendar: {}",
        config
            .utc_offset_minutes
            .map_or("host local zone".to_string(), |m| format!("UTC{m:+} min"))
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(tenant_manager.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("compacting WALs before exit");
    compactor::compact_all(&tenant_manager.engines()).await;
    info!("tourocc stopped");
    Ok(())
}

async fn run_migrate(config: Config, input: &std::path::Path) -> Result<(), BoxError> {
    let records = migrate::load_records(input)?;
    let tenant_manager = open_tenants(&config)?;
    let report = migrate::run_migration(&tenant_manager, records).await;
    compactor::compact_all(&tenant_manager.engines()).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    {
        let sigterm = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("failed to register SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm => {}
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;
    info!("shutdown signal received, draining requests");
}

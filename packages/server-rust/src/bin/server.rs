//! `dataservice` server binary.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dataservice_server::loader::{BoundaryTracker, ProcessModuleHost};
use dataservice_server::{telemetry, Cli, NetworkModule, OperationService};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = telemetry::initialise(&cli.telemetry_config()) {
        eprintln!("dataservice: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "server stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let server_config = cli.server_config();
    let network_config = cli.network_config();
    if network_config.transport_timeout <= server_config.operation_timeout() {
        warn!(
            transport_timeout_secs = network_config.transport_timeout.as_secs(),
            operation_timeout_ms = server_config.operation_timeout_ms,
            "transport timeout does not exceed the operation deadline; \
             slow operations may get a bare 408 instead of a failure envelope"
        );
    }
    info!(
        module_dir = %server_config.module_dir.display(),
        pattern = %server_config.module_pattern,
        "discovering modules"
    );

    let host = Arc::new(ProcessModuleHost::new(BoundaryTracker::default()));
    let operations = Arc::new(OperationService::start(server_config, host).await?);
    info!(operations = operations.catalog().len(), "operation catalog ready");

    #[cfg(unix)]
    spawn_reload_on_hangup(Arc::clone(&operations))?;

    let mut network = NetworkModule::new(network_config, operations);
    let port = network.start().await?;
    info!(port, "dataservice listening");

    network.serve(shutdown_signal()).await
}

/// Rebuilds the catalog on every SIGHUP. A failed rebuild keeps the old one.
#[cfg(unix)]
fn spawn_reload_on_hangup(operations: Arc<OperationService>) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!("SIGHUP received, reloading modules");
            if let Err(err) = operations.reload().await {
                warn!(error = %err, "module reload failed; keeping current catalog");
            }
        }
    });
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

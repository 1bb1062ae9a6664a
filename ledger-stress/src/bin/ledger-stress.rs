//! Ledger Stress Runner
//!
//! Drives reader, transactor and churner workers against the ledger database
//! until SIGINT or SIGTERM, then drains them and prints per-metric totals.

use ledger_accounting::{Accounting, PgLedgerStore};
use ledger_stress::server::MetricsServer;
use ledger_stress::{logging, Config, LifecycleController, Metrics, OutcomeClassifier};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init(&config.logging)?;

    let run_id = Uuid::new_v4();
    let run_span = logging::run_span(run_id);
    run(config, run_id, run_span.clone()).instrument(run_span).await
}

async fn run(config: Config, run_id: Uuid, run_span: tracing::Span) -> anyhow::Result<()> {
    info!(
        workers = config.workload.total_workers(),
        max_connections = config.max_connections(),
        "Ledger stress runner starting"
    );

    let store = PgLedgerStore::connect(&config.database).await?;
    if config.database.bootstrap_schema {
        store.ensure_schema().await?;
    }

    let accounting = Arc::new(Accounting::new(store));
    accounting
        .ensure_population(
            config.workload.seed_accounts,
            config.workload.seed_balance_cents,
        )
        .await?;

    let metrics = Metrics::new(&config.telemetry.metric_prefix)?;
    let classifier = OutcomeClassifier::new(Arc::new(metrics.clone()));

    let controller = LifecycleController::new(
        Arc::clone(&accounting),
        classifier,
        config.workload.clone(),
        run_span,
    );

    let server_shutdown = CancellationToken::new();
    let server = match &config.telemetry.metrics_listen_addr {
        Some(addr) => {
            let server = MetricsServer::bind(addr.parse()?, metrics.clone(), run_id).await?;
            Some(tokio::spawn(server.run(server_shutdown.clone())))
        }
        None => None,
    };

    let shutdown_signal = shutdown_signal()?;
    controller.start();
    controller.run_until(shutdown_signal).await;

    server_shutdown.cancel();
    if let Some(handle) = server {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Metrics endpoint failed"),
            Err(e) => warn!(error = %e, "Metrics endpoint task panicked"),
        }
    }

    accounting.store().close().await;

    for (metric, count) in metrics.snapshot() {
        info!(metric = %metric, count, "Final total");
    }
    info!("END");

    Ok(())
}

/// Register SIGINT and SIGTERM up front; the returned future resolves on either
fn shutdown_signal() -> std::io::Result<impl std::future::Future<Output = ()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        Ok(async move {
            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
        })
    }
    #[cfg(not(unix))]
    {
        Ok(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received");
            }
        })
    }
}

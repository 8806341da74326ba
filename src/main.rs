use anyhow::Context;
use clap::Parser; // for cli
use std::sync::Arc;
use std::time::Duration;

use express_metrics::config::Args;
use express_metrics::heavy_task::SimulatedHeavyTask;
use express_metrics::logging::{init_tracing, loki_shipper};
use express_metrics::metrics::{HttpMetrics, MetricsRegistry};
use express_metrics::process::{ProcessGauges, process_collector};
use express_metrics::state::AppState;
use express_metrics::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();

    let loki_rx = init_tracing(!args.no_loki)?;
    if let Some(rx) = loki_rx {
        tokio::spawn(loki_shipper(
            rx,
            reqwest::Client::new(),
            args.loki_url.clone(),
            args.app_name.clone(),
        ));
    }

    // registration errors are fatal
    let registry = MetricsRegistry::new();
    let http_metrics = HttpMetrics::register(&registry).context("registering request metrics")?;
    let process_gauges = ProcessGauges::register(&registry).context("registering process gauges")?;

    tokio::spawn(process_collector(
        process_gauges,
        Duration::from_secs(args.process_metrics_interval.max(1)),
    ));

    let state = Arc::new(AppState::new(
        registry,
        http_metrics,
        Arc::new(SimulatedHeavyTask::new(args.slow_failure_rate)),
    ));

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("Server started at http://localhost:{}", args.port);
    if args.no_loki {
        tracing::info!("Log shipping disabled");
    } else {
        tracing::info!(loki = %args.loki_url, "Shipping logs to Loki");
    }

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

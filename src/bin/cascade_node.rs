//! Service node binary: wires the request cycle to HTTP, the rate collector and
//! the exported gauges.

use cascade_node::downstream::HttpDownstream;
use cascade_node::loadgen::LoadGenerator;
use cascade_node::resilience::ConcurrencyGate;
use cascade_node::server::{self, AppState};
use cascade_node::telemetry::{
    noop_sink, HttpRateSink, OutcomeAggregator, OutcomeGauges, RateSink, Reporter,
};
use cascade_node::work::CpuWork;
use cascade_node::{NodeConfig, ServiceNode};
use clap::Parser;
use prometheus::Registry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_target(false)
        .init();

    let config = NodeConfig::parse().finalize()?;
    tracing::info!(
        service = %config.service_name,
        instance = %config.instance_name(),
        ops_limit = config.ops_limit,
        dependencies = ?config.dependency_list(),
        "starting service node"
    );

    let registry = Registry::new();
    let gate = Arc::new(ConcurrencyGate::new(config.ops_limit));
    let aggregator = Arc::new(OutcomeAggregator::new());
    let gauges = OutcomeGauges::register(&config.service_name, &registry)?;
    let sink: Arc<dyn RateSink> = match config.metrics_url() {
        Some(url) => Arc::new(HttpRateSink::new(url, HttpRateSink::DEFAULT_TIMEOUT)?),
        None => noop_sink(),
    };
    let downstream = HttpDownstream::new(&config.cluster_domain, config.downstream_timeout())?;

    let node = Arc::new(ServiceNode::new(
        gate,
        Arc::clone(&aggregator),
        Arc::new(CpuWork),
        Arc::new(downstream),
    ));
    let request = Arc::new(config.cycle_request());

    let cancel = CancellationToken::new();
    let reporter = Reporter::new(
        config.service_name.clone(),
        config.instance_name(),
        aggregator,
    )
    .with_gauges(gauges)
    .with_sink(sink)
    .with_interval(config.report_interval())
    .spawn(cancel.child_token());

    let generator = LoadGenerator::new(
        Arc::clone(&node),
        Arc::clone(&request),
        config.generate_ops,
    )
    .spawn(cancel.child_token());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let listener = TcpListener::bind(config.listen).await?;
    let app = server::router(AppState {
        node,
        request,
        registry,
    });
    server::serve(listener, app, cancel.clone()).await?;

    cancel.cancel();
    if let Some(generator) = generator {
        let _ = generator.await;
    }
    reporter.stop().await;
    Ok(())
}

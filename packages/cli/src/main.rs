use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use elreader::{EvmLedgerGateway, OperatorSetReader};
use elreader_cli::{args::Cli, command, config::Config};
use opentelemetry::global;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::{
    config::{ConfigBuilder, ConfigExt},
    context::AppContext,
    evm_client::EvmQueryClient,
    telemetry::{setup_metrics, setup_tracing, AggregationMetrics},
};

fn main() -> Result<()> {
    let Cli { args, command } = Cli::parse();
    let config: Config = ConfigBuilder::new(args).build()?;

    let ctx = AppContext::new()?;

    // setup tracing, stdout is reserved for the json output
    let filters = config.tracing_env_filter()?;
    let tracer_provider = if let Some(collector) = config.jaeger.as_ref() {
        Some(ctx.rt.block_on(async {
            setup_tracing(collector, "elreader", filters)
        })?)
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .without_time()
                    .with_target(false),
            )
            .with(filters)
            .try_init()?;
        None
    };

    let meter_provider = match config.prometheus.as_ref() {
        Some(collector) => Some(ctx.rt.block_on(async {
            setup_metrics(collector, "elreader_metrics", None)
        })?),
        None => None,
    };
    let metrics = AggregationMetrics::new(global::meter("elreader_metrics"));

    ctrlc::set_handler({
        let ctx = ctx.clone();
        move || {
            tracing::warn!("interrupted, cancelling");
            ctx.kill();
        }
    })?;

    let res = ctx.rt.block_on({
        let ctx = ctx.clone();
        async move {
            let client = EvmQueryClient::new(config.endpoint()?).await?;
            let allocation_manager = config.allocation_manager()?;
            client
                .ensure_contract(allocation_manager)
                .await
                .context("AllocationManager not found")?;

            let gateway = Arc::new(EvmLedgerGateway::new(
                client,
                allocation_manager,
                config.request_timeout(),
            ));
            let reader =
                OperatorSetReader::new(gateway, config.aggregator_config()).with_metrics(metrics);

            let kill = ctx.kill_signal();
            let cancel = async move {
                match config.deadline() {
                    Some(deadline) => {
                        tokio::select! {
                            _ = kill => {},
                            _ = tokio::time::sleep(deadline) => {
                                tracing::warn!("deadline of {:?} passed", deadline);
                            }
                        }
                    }
                    None => kill.await,
                }
            };

            command::run(&reader, command, cancel).await
        }
    });

    if let Some(meter_provider) = meter_provider {
        if let Err(err) = meter_provider.shutdown() {
            tracing::error!("failed to shutdown meter provider: {err}");
        }
    }
    if let Some(tracer) = tracer_provider {
        if let Err(err) = tracer.shutdown() {
            tracing::error!("failed to shutdown tracer provider: {err}");
        }
    }

    println!("{}", serde_json::to_string_pretty(&res?)?);

    Ok(())
}

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    resource::Resource,
    trace::{self, Sampler, SdkTracerProvider},
};
use tracing_subscriber::layer::SubscriberExt;

pub fn setup_tracing(
    collector: &str,
    service_name: &str,
    filters: tracing_subscriber::EnvFilter,
) -> Result<SdkTracerProvider> {
    global::set_text_map_propagator(opentelemetry_jaeger_propagator::Propagator::new());
    let endpoint = format!("{}/v1/traces", collector);
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("Failed to build OTLP span exporter")?;

    let batch_processor = trace::BatchSpanProcessor::builder(exporter).build();

    let provider = SdkTracerProvider::builder()
        .with_span_processor(batch_processor)
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(format!("{}-tracer", service_name));
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let subscriber = tracing_subscriber::Registry::default()
        .with(filters)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(telemetry);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    tracing::info!("Jaeger tracing enabled");
    Ok(provider)
}

pub fn setup_metrics(
    collector: &str,
    service_name: &str,
    push_interval_secs: Option<u64>,
) -> Result<SdkMeterProvider> {
    let endpoint = format!("{}/api/v1/otlp/v1/metrics", collector);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(endpoint)
        .build()
        .context("Failed to build OTLP metric exporter")?;

    let mut reader = PeriodicReader::builder(exporter);
    if let Some(secs) = push_interval_secs {
        reader = reader.with_interval(Duration::from_secs(secs));
    }

    let meter_provider = SdkMeterProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .with_reader(reader.build())
        .build();

    global::set_meter_provider(meter_provider.clone());

    tracing::info!("Metrics enabled and exporting to {}", collector);

    Ok(meter_provider)
}

#[derive(Clone, Debug)]
pub struct AggregationMetrics {
    pub aggregations: Counter<u64>,
    pub aggregation_failures: Counter<u64>,
    pub operator_sets: Counter<u64>,
    pub ledger_calls: Counter<u64>,
    pub aggregation_duration: Histogram<f64>,
}

impl AggregationMetrics {
    pub const LABEL: &'static str = "elreader";

    pub fn new(meter: Meter) -> Self {
        Self {
            aggregations: meter
                .u64_counter(format!("{}_aggregations", Self::LABEL))
                .with_description("Slashable stake aggregations that returned a result")
                .build(),
            aggregation_failures: meter
                .u64_counter(format!("{}_aggregation_failures", Self::LABEL))
                .with_description("Slashable stake aggregations that failed, by stage")
                .build(),
            operator_sets: meter
                .u64_counter(format!("{}_operator_sets", Self::LABEL))
                .with_description("Operator set snapshots produced")
                .build(),
            ledger_calls: meter
                .u64_counter(format!("{}_ledger_calls", Self::LABEL))
                .with_description("Read-only contract calls issued")
                .build(),
            aggregation_duration: meter
                .f64_histogram(format!("{}_aggregation_duration_seconds", Self::LABEL))
                .with_description("Wall time of a whole aggregation")
                .build(),
        }
    }

    pub fn record_success(&self, operator_sets: usize, elapsed: Duration) {
        self.aggregations.add(1, &[]);
        self.operator_sets.add(operator_sets as u64, &[]);
        self.aggregation_duration.record(
            elapsed.as_secs_f64(),
            &[KeyValue::new("outcome", "success")],
        );
    }

    pub fn record_failure(&self, stage: &'static str, elapsed: Duration) {
        self.aggregation_failures
            .add(1, &[KeyValue::new("stage", stage)]);
        self.aggregation_duration.record(
            elapsed.as_secs_f64(),
            &[KeyValue::new("outcome", "failure")],
        );
    }

    pub fn increment_ledger_calls(&self, function: &'static str) {
        self.ledger_calls
            .add(1, &[KeyValue::new("function", function)]);
    }
}

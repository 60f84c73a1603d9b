//! Logging and trace export for carepath
//!
//! Installs a `tracing-subscriber` registry that always logs to stdout and,
//! when an exporter is configured, also ships spans over OTLP.

mod metadata;

use carepath_config::TelemetryConfig;
use carepath_config::telemetry::exporters::{ExportProtocol, ExporterConfig};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const FALLBACK_FILTER: &str = "info";

/// Keeps the trace pipeline alive; flushes and shuts it down on drop
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are exported over OTLP
    pub const fn exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown tracer provider: {e}");
        }
    }
}

/// Initialize logging and optional span export
///
/// `log_filter` uses `EnvFilter` directive syntax; an invalid filter falls
/// back to `info`. The returned guard must be held for the lifetime of the
/// process.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built
pub fn init(config: Option<&TelemetryConfig>, log_filter: &str) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let Some((config, exporter)) = config.and_then(|c| c.trace_exporter().map(|e| (c, e))) else {
        tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        return Ok(TelemetryGuard { tracer_provider: None });
    };

    let tracer_provider = init_tracer(config, exporter)?;
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("carepath"));
    global::set_tracer_provider(tracer_provider.clone());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    tracing::info!(endpoint = %exporter.endpoint, "exporting spans over OTLP");
    Ok(TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    })
}

fn init_tracer(config: &TelemetryConfig, exporter: &ExporterConfig) -> anyhow::Result<SdkTracerProvider> {
    let provider = SdkTracerProvider::builder()
        .with_resource(metadata::build_resource(config))
        .with_sampler(sampler(config))
        .with_batch_exporter(build_span_exporter(exporter)?)
        .build();

    Ok(provider)
}

/// Ratio sampler from the tracing settings, parent-based unless disabled
fn sampler(config: &TelemetryConfig) -> Sampler {
    let rate = config.tracing.as_ref().map_or(1.0, |t| t.sampling_rate);

    let sampler = if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    };

    if config.tracing.as_ref().is_none_or(|t| t.parent_based) {
        Sampler::ParentBased(Box::new(sampler))
    } else {
        sampler
    }
}

fn build_span_exporter(config: &ExporterConfig) -> anyhow::Result<SpanExporter> {
    let exporter = match config.protocol {
        ExportProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build gRPC span exporter: {e}"))?,
        ExportProtocol::HttpProto => SpanExporter::builder()
            .with_http()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP span exporter: {e}"))?,
    };

    Ok(exporter)
}

use opentelemetry::global;
use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use strum::Display;
use thiserror::Error as ThisError;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber for a uniqueness checker process.
///
/// - When `enable_tracing` is false only JSON logs are written to stdout.
/// - When tracing is enabled and `grpc_endpoint` is set, spans are additionally exported over OTLP.
/// - When tracing is enabled without an endpoint, bunyan formatted logs carry the span fields.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_otel_logs_tracing(service_name: String, enable_tracing: bool, grpc_endpoint: Option<String>, default_level: &'static str) -> Result<(), OtelInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if !enable_tracing {
        let subscriber = tracing_subscriber::registry().with(fmt::Layer::new().json()).with(env_filter);
        set_global_default(subscriber).map_err(OtelInitError::from_global_subscriber_error)?;
        return Ok(());
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    match grpc_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_protocol(opentelemetry_otlp::Protocol::Grpc)
                .build()
                .map_err(OtelInitError::from_exporter_error)?;

            let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_batch_exporter(exporter).build();
            let otlp_layer = tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name));

            let subscriber = tracing_subscriber::registry()
                .with(fmt::Layer::new().json())
                .with(env_filter)
                .with(otlp_layer);
            set_global_default(subscriber).map_err(OtelInitError::from_global_subscriber_error)?;
        }
        None => {
            let bunyan_layer = BunyanFormattingLayer::new(service_name, std::io::stdout);
            let subscriber = tracing_subscriber::registry().with(env_filter).with(JsonStorageLayer).with(bunyan_layer);
            set_global_default(subscriber).map_err(OtelInitError::from_global_subscriber_error)?;
        }
    }

    tracing::info!("OTEL logging and tracing initialised");
    Ok(())
}

/// Installs the global OTLP meter provider. Without an endpoint the opentelemetry no-op provider
/// stays in place and every instrument created through `global::meter` is inert.
pub fn init_otel_metrics(grpc_endpoint: Option<String>) -> Result<(), OtelInitError> {
    let Some(endpoint) = grpc_endpoint else {
        tracing::info!("No OTEL metrics endpoint configured, metrics will not be exported");
        return Ok(());
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_protocol(opentelemetry_otlp::Protocol::Grpc)
        .build()
        .map_err(|metric_error| OtelInitError {
            kind: InitErrorType::MetricError,
            reason: "Unable to initialise metrics exporter".into(),
            cause: Some(format!("{:?}", metric_error)),
        })?;

    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder().with_periodic_exporter(exporter).build();
    global::set_meter_provider(provider);

    tracing::info!("OTEL metrics initialised");
    Ok(())
}

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum InitErrorType {
    GlobalSubscriberError,
    SpanExporter,
    MetricError,
}

#[derive(Debug, ThisError)]
#[error("Error initialising OTEL telemetry: '{kind}'.\nReason: {reason}\nCause: {cause:?}")]
pub struct OtelInitError {
    pub kind: InitErrorType,
    pub reason: String,
    pub cause: Option<String>,
}

impl OtelInitError {
    pub fn from_global_subscriber_error(cause: SetGlobalDefaultError) -> Self {
        OtelInitError {
            kind: InitErrorType::GlobalSubscriberError,
            reason: "Unable to set subscriber into global registry".into(),
            cause: Some(cause.to_string()),
        }
    }

    pub fn from_exporter_error(cause: TraceError) -> Self {
        OtelInitError {
            kind: InitErrorType::SpanExporter,
            reason: "Unable to initialise OTEL span exporter".into(),
            cause: Some(cause.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_without_endpoint_is_a_noop() {
        assert!(init_otel_metrics(None).is_ok());
    }

    #[test]
    fn init_error_display_carries_kind_and_reason() {
        let error = OtelInitError {
            kind: InitErrorType::MetricError,
            reason: "boom".into(),
            cause: None,
        };
        let text = error.to_string();
        assert!(text.contains("'MetricError'"));
        assert!(text.contains("Reason: boom"));
    }
}

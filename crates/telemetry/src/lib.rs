//! Structured logging and optional OTel metrics for the signing pipeline.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("otel setup failed: {0}")]
    Otel(String),
}

/// Initialize structured logging (JSON) with env filter.
/// Set `RUST_LOG`, e.g. `"info,zatca_sign=debug"`.
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Initialize an OpenTelemetry tracer (behind the `otel` feature). Does not install a
/// tracing-subscriber layer; callers combine this with [`init_json_logging`] as needed.
#[cfg(feature = "otel")]
pub fn init_otel(service_name: &str) -> Result<(), TelemetryError> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::trace as sdktrace;
    use opentelemetry_sdk::{runtime, Resource};

    let resource = Resource::new(vec![KeyValue::new("service.name", service_name.to_owned())]);
    let _tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().http())
        .with_trace_config(sdktrace::config().with_resource(resource))
        .install_batch(runtime::Tokio)
        .map_err(|e| TelemetryError::Otel(e.to_string()))?;
    Ok(())
}

#[cfg(feature = "otel")]
pub mod metrics {
    //! OTel instruments for the signing pipeline: a failure counter tagged by
    //! error code, and a duration histogram, mirroring what the verification
    //! path of a plugin/supply-chain verifier would emit.
    use super::TelemetryError;
    use once_cell::sync::OnceCell;
    use opentelemetry::metrics::{Counter, Histogram, Meter, Unit};
    use opentelemetry::global;

    static METRICS_INIT: OnceCell<()> = OnceCell::new();

    fn detect_service_name() -> String {
        std::env::var("OTEL_SERVICE_NAME")
            .or_else(|_| std::env::var("ZATCA_SERVICE_NAME"))
            .unwrap_or_else(|_| "zatca-sign".to_string())
    }

    fn init_metrics_from_env() -> Result<(), TelemetryError> {
        let _svc = detect_service_name();
        let provider = opentelemetry_otlp::new_pipeline()
            .metrics(opentelemetry_sdk::runtime::Tokio)
            .with_exporter(opentelemetry_otlp::new_exporter().http())
            .build()
            .map_err(|e| TelemetryError::Otel(e.to_string()))?;
        global::set_meter_provider(provider);
        Ok(())
    }

    fn ensure_metrics_provider() {
        let _ = METRICS_INIT.get_or_init(|| {
            let _ = init_metrics_from_env();
        });
    }

    /// Counters/histograms for the `sign` and `compute_hash` operations.
    #[derive(Clone)]
    pub struct SignInstruments {
        failures: Counter<u64>,
        duration_ms: Histogram<f64>,
    }

    impl SignInstruments {
        /// Increment the failure counter, tagged with a stable `error_code`.
        pub fn inc_failure(&self, error_code: &'static str) {
            self.failures.add(1, &[opentelemetry::KeyValue::new("error_code", error_code)]);
        }

        /// Record the wall-clock duration of a sign/hash operation.
        pub fn observe_ms(&self, ms: f64) {
            self.duration_ms.record(ms, &[]);
        }
    }

    /// Initialize (idempotent) the global sign instruments.
    pub fn init_sign_instruments() -> SignInstruments {
        ensure_metrics_provider();
        let meter: Meter = global::meter("zatca.sign");
        SignInstruments {
            failures: meter
                .u64_counter("zatca.sign.failures")
                .with_description("Number of sign/hash pipeline failures")
                .init(),
            duration_ms: meter
                .f64_histogram("zatca.sign.duration_ms")
                .with_description("sign()/compute_hash() wall-clock duration")
                .with_unit(Unit::new("ms"))
                .init(),
        }
    }
}

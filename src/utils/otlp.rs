use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use opentelemetry_semantic_conventions::{
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_NAME, SERVICE_VERSION},
    SCHEMA_URL,
};
use tracing_subscriber::{EnvFilter, Layer};
use url::Url;

const OTEL_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const OTEL_LEVEL: &str = "OTEL_LEVEL";
const OTEL_ENVIRONMENT: &str = "OTEL_ENVIRONMENT_NAME";

/// Drop guard for the OTEL provider. Shuts the provider down when dropped,
/// so hold it for the lifetime of `main`.
#[derive(Debug)]
pub struct OtelGuard(SdkTracerProvider, EnvFilter);

impl OtelGuard {
    /// Create a filtered tracing layer exporting to the provider.
    pub fn layer<S>(&self) -> impl Layer<S>
    where
        S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
    {
        let tracer = self.0.tracer("tg-oauth-webapp");
        tracing_opentelemetry::layer()
            .with_tracer(tracer)
            .with_filter(self.1.clone())
    }
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.0.shutdown() {
            eprintln!("{err:?}");
        }
    }
}

/// OTLP exporter configuration, loaded from env.
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` - where traces are sent. If missing,
///   [`OtelConfig::load`] returns [`None`] and exporting is disabled.
/// - `OTEL_LEVEL` - [`EnvFilter`] directives for exported spans. Defaults to
///   `RUST_LOG`.
/// - `OTEL_ENVIRONMENT_NAME` - the `deployment.environment.name` resource
///   value. Defaults to `"unknown"`.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OtelConfig {
    /// The OTLP HTTP endpoint.
    pub endpoint: Url,

    /// Filter applied to exported spans.
    pub level: EnvFilter,

    /// OTEL convention `deployment.environment.name`
    pub environment: String,
}

impl FromEnv for OtelConfig {
    type Error = url::ParseError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: OTEL_ENDPOINT,
                description:
                    "OTLP endpoint to send traces to, a url. If missing, disables OTLP exporting.",
                optional: true,
            },
            &EnvItemInfo {
                var: OTEL_LEVEL,
                description: "OTLP level to export, in RUST_LOG format. Defaults to RUST_LOG.",
                optional: true,
            },
            &EnvItemInfo {
                var: OTEL_ENVIRONMENT,
                description: "OTLP environment name, a string",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let endpoint = Url::from_env_var(OTEL_ENDPOINT)?;

        let level = if std::env::var(OTEL_LEVEL)
            .as_ref()
            .map(String::len)
            .unwrap_or_default()
            > 0
        {
            EnvFilter::from_env(OTEL_LEVEL)
        } else {
            EnvFilter::from_default_env()
        };

        let environment = String::from_env_var(OTEL_ENVIRONMENT).unwrap_or("unknown".into());

        Ok(Self {
            endpoint,
            level,
            environment,
        })
    }
}

impl OtelConfig {
    /// Load from env vars, returning [`None`] when the endpoint is missing
    /// or unparsable.
    pub fn load() -> Option<Self> {
        Self::from_env().ok()
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                    KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, self.environment.clone()),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    /// Build the OTLP exporter and provider. Returns [`None`] (after logging
    /// to stderr, as tracing is not up yet) if the exporter cannot be built.
    pub fn provider(&self) -> Option<OtelGuard> {
        let exporter = match opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()
        {
            Ok(exporter) => exporter,
            Err(err) => {
                eprintln!("failed to build OTLP exporter: {err}");
                return None;
            }
        };

        let provider = SdkTracerProvider::builder()
            .with_resource(self.resource())
            .with_batch_exporter(exporter)
            .build();

        Some(OtelGuard(provider, self.level.clone()))
    }
}

use crate::utils::{
    from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar},
    otlp::{OtelConfig, OtelGuard},
};
use std::convert::Infallible;
use tracing::Subscriber;
use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, Layer,
};

const TRACING_LOG_JSON: &str = "TRACING_LOG_JSON";
const RUST_LOG: &str = "RUST_LOG";
const RUST_OTEL_TRACE: &str = "RUST_OTEL_TRACE";

/// Directives used when `RUST_LOG` is unset. Flow transitions log at
/// `debug`, so they are on by default.
pub const DEFAULT_LOG_FILTER: &str = "info,tg_oauth_webapp=debug";

/// Line format of the log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Log output settings.
///
/// ## Env Reads
///
/// - `TRACING_LOG_JSON` - If set and non-empty, log JSON lines.
/// - `RUST_LOG` - Directives for the log output. Defaults to
///   [`DEFAULT_LOG_FILTER`].
/// - `RUST_OTEL_TRACE` - Directives for exported spans. Defaults to the
///   log directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Output format.
    pub format: LogFormat,
    /// Directives for the log output.
    pub filter: String,
    /// Directives for exported spans, if they differ from `filter`.
    pub otel_filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: DEFAULT_LOG_FILTER.to_owned(),
            otel_filter: None,
        }
    }
}

impl FromEnv for LogConfig {
    type Error = Infallible;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: TRACING_LOG_JSON,
                description: "If set, log JSON lines instead of text.",
                optional: true,
            },
            &EnvItemInfo {
                var: RUST_LOG,
                description: "Log directives. Defaults to info, with debug for this service.",
                optional: true,
            },
            &EnvItemInfo {
                var: RUST_OTEL_TRACE,
                description: "Directives for spans exported over OTLP. Defaults to RUST_LOG.",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let json = bool::from_env_var(TRACING_LOG_JSON).unwrap_or(false);
        Ok(Self {
            format: if json { LogFormat::Json } else { LogFormat::Text },
            filter: Option::<String>::from_env_var(RUST_LOG)?
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
            otel_filter: Option::<String>::from_env_var(RUST_OTEL_TRACE)?,
        })
    }
}

impl LogConfig {
    /// Filter for the log output. Bad directives are skipped.
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::builder().parse_lossy(&self.filter)
    }

    /// Filter for exported spans.
    pub fn span_filter(&self) -> EnvFilter {
        EnvFilter::builder().parse_lossy(self.otel_filter.as_deref().unwrap_or(&self.filter))
    }

    fn fmt_layer<S>(&self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'span> LookupSpan<'span>,
    {
        let layer = tracing_subscriber::fmt::layer();
        match self.format {
            LogFormat::Json => layer.json().with_filter(self.log_filter()).boxed(),
            LogFormat::Text => layer.with_filter(self.log_filter()).boxed(),
        }
    }

    /// Install the global subscriber, exporting spans over OTLP when
    /// [`OtelConfig`] is present. Returns the exporter guard, if any.
    ///
    /// If a global subscriber is already installed, the existing one is kept.
    pub fn install(&self) -> Option<OtelGuard> {
        let guard = OtelConfig::load().and_then(|cfg| cfg.provider());

        let installed = tracing_subscriber::registry()
            .with(
                guard
                    .as_ref()
                    .map(|guard| guard.layer().with_filter(self.span_filter())),
            )
            .with(self.fmt_layer())
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!(
                format = ?self.format,
                filter = %self.filter,
                otlp = guard.is_some(),
                "tracing installed"
            );
        }
        guard
    }
}

/// Init tracing from env, returning an optional guard for the OTEL provider.
/// See [`LogConfig`] and [`OtelConfig`] for the variables read.
pub fn init_tracing() -> Option<OtelGuard> {
    // every LogConfig field is infallible or defaulted
    LogConfig::from_env().unwrap_or_default().install()
}

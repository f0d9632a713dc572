//! Prometheus exporter setup and the metric names this crate records.

use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{
    net::{Ipv4Addr, SocketAddr},
    num::ParseIntError,
    sync::Once,
};

const METRICS_PORT: &str = "METRICS_PORT";

/// Default port for the Prometheus scrape endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9000;

/// Counter of completed page flows, labelled by `outcome`.
pub const FLOW_OUTCOMES: &str = "webapp.flow.outcomes";
/// Counter of backend calls, labelled by `endpoint` and `result`.
pub const BACKEND_CALLS: &str = "webapp.backend.calls";

/// Metrics exporter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Port the scrape endpoint listens on, bound on all interfaces.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_METRICS_PORT,
        }
    }
}

impl FromEnv for MetricsConfig {
    type Error = ParseIntError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![&EnvItemInfo {
            var: METRICS_PORT,
            description: "Port for the Prometheus metrics endpoint. Defaults to 9000.",
            optional: true,
        }]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let port = u16::from_env_var_or(METRICS_PORT, DEFAULT_METRICS_PORT)?;
        Ok(Self { port })
    }
}

impl MetricsConfig {
    fn describe() {
        metrics::describe_counter!(FLOW_OUTCOMES, "Page flows by final outcome");
        metrics::describe_counter!(BACKEND_CALLS, "Backend auth API calls by endpoint and result");
    }

    /// Install the global Prometheus recorder and its HTTP listener. Must be
    /// called from within a tokio runtime. Calling it more than once is a
    /// no-op.
    pub fn install(&self) {
        static ONCE: Once = Once::new();
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));

        ONCE.call_once(|| {
            match PrometheusBuilder::new().with_http_listener(addr).install() {
                Ok(()) => {
                    Self::describe();
                    tracing::debug!(%addr, "metrics exporter listening");
                }
                Err(error) => tracing::warn!(%error, "failed to install metrics exporter"),
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn port_defaults_and_overrides() {
        std::env::remove_var(METRICS_PORT);
        assert_eq!(MetricsConfig::from_env().unwrap().port, DEFAULT_METRICS_PORT);

        std::env::set_var(METRICS_PORT, "9464");
        assert_eq!(MetricsConfig::from_env().unwrap().port, 9464);

        std::env::set_var(METRICS_PORT, "not-a-port");
        assert!(MetricsConfig::from_env().is_err());

        std::env::remove_var(METRICS_PORT);
    }
}

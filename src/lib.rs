//! Google OAuth kickoff and callback pages for a Telegram bot.
//!
//! Users arrive from the bot at `/?user_id=<id>`. The page checks whether
//! they are already connected, offers a sign-in button that starts the
//! provider's authorization flow, and, when the provider redirects back with
//! a code, asks the backend to finish the exchange and then sends the user
//! back to Telegram.
//!
//! The OAuth work itself (token exchange, storage, bot notification) is done
//! by a separate backend reached through [`backend::AuthBackend`].
//!
//! ## Layout
//!
//! - [`config`] - backend URL resolution and env-loaded settings.
//! - [`params`] - query parameters and flow selection.
//! - [`flow`] - the per-load state machine.
//! - [`backend`] - the backend client.
//! - [`page`] - what the user sees.
//! - [`server`] - the axum routes.
//! - [`utils`] - env loading, tracing, metrics.

#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod backend;
pub mod config;
pub mod flow;
pub mod page;
pub mod params;
pub mod server;
pub mod task;

/// Ambient utilities.
pub mod utils {
    /// Loading config from env vars.
    pub mod from_env;

    /// Prometheus metrics.
    pub mod metrics;

    /// Tracing spans for axum requests.
    pub mod otel_axum;

    /// OTLP export.
    pub mod otlp;

    /// Subscriber setup.
    pub mod tracing;
}

use crate::utils::{from_env::FromEnv, metrics::MetricsConfig, otlp::OtelGuard};

/// Set up tracing and metrics for the webapp binary.
///
/// Returns the OTLP guard, if exporting is configured. Hold it for the life
/// of `main`. Must be called from within a tokio runtime.
pub fn init_webapp() -> Option<OtelGuard> {
    let guard = utils::tracing::init_tracing();
    let metrics = MetricsConfig::from_env().unwrap_or_else(|error| {
        tracing::warn!(%error, "invalid metrics config, using defaults");
        MetricsConfig::default()
    });
    metrics.install();
    guard
}

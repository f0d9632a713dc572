//! HTTP surface: the page itself, the sign-in form target, and the env
//! script for statically hosted copies of the page.

use crate::{
    backend::{AuthBackend, HttpBackend},
    config::{FlowConfig, WebappConfig, FALLBACK_BACKEND_URL},
    flow::{AuthFlow, FlowEvent},
    page::Navigation,
    params::{PageParams, UserId},
    utils::otel_axum::RequestSpanLayer,
};
use axum::{
    extract::{RawQuery, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tracing::info;

/// Shared state for all requests.
#[derive(Debug, Clone)]
pub struct AppState {
    config: Arc<FlowConfig>,
    backend: Arc<dyn AuthBackend>,
    env_script: Arc<str>,
}

impl AppState {
    /// State for a server talking to `backend`. `published_backend` is what
    /// `/api/env.js` hands to static pages.
    pub fn new(
        config: FlowConfig,
        backend: Arc<dyn AuthBackend>,
        published_backend: Option<&str>,
    ) -> Self {
        let published = published_backend.unwrap_or(FALLBACK_BACKEND_URL);
        Self {
            config: Arc::new(config),
            backend,
            env_script: env_script(published).into(),
        }
    }

    /// State with an [`HttpBackend`], built from env config.
    pub fn from_config(cfg: &WebappConfig) -> Self {
        let backend = HttpBackend::new(cfg.flow.backend.clone(), cfg.flow.initiate_method);
        Self::new(
            cfg.flow.clone(),
            Arc::new(backend),
            cfg.injected_backend.as_deref(),
        )
    }

    fn flow(&self) -> AuthFlow {
        AuthFlow::new(Arc::clone(&self.config), Arc::clone(&self.backend))
    }
}

/// The JavaScript served at `/api/env.js`.
pub fn env_script(backend_url: &str) -> String {
    let literal = serde_json::Value::String(backend_url.to_owned());
    format!(
        "// Environment variables injected at request time\n\
         window.ENV_BACKEND_URL = {literal};\n\
         window.ENV_CONFIG_LOADED = true;\n"
    )
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(page))
        .route("/signin", post(sign_in))
        .route("/api/env.js", get(env_js))
        .route("/health", get(health))
        .layer(RequestSpanLayer)
        .with_state(state)
}

/// Bind the configured port and serve until the process exits.
pub async fn serve(cfg: &WebappConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, backend = %cfg.flow.backend.url(), source = ?cfg.flow.backend.source(), "serving");
    axum::serve(listener, router(AppState::from_config(cfg))).await
}

fn respond(flow: &AuthFlow) -> Response {
    let view = flow.page().snapshot();
    if let Some(Navigation::Now(url)) = &view.navigation {
        return Redirect::to(url.as_str()).into_response();
    }
    let user = flow.state().sign_in_user().map(|id| id.to_string());
    Html(view.render_html(user.as_deref())).into_response()
}

async fn page(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let params = PageParams::from_query(query.as_deref().unwrap_or_default());
    let flow = state.flow();
    // The notify task outlives the request on purpose.
    let _notify = flow.run_load(&params).await;
    respond(&flow)
}

#[derive(Debug, Deserialize)]
struct SignInForm {
    user_id: Option<String>,
}

async fn sign_in(State(state): State<AppState>, Form(form): Form<SignInForm>) -> Response {
    let flow = state.flow();
    match form.user_id.as_deref().map(str::parse::<UserId>) {
        Some(Ok(user_id)) => {
            flow.await_user(user_id);
            flow.run_sign_in().await;
        }
        _ => {
            flow.apply(FlowEvent::IdentifierMissing);
        }
    }
    respond(&flow)
}

async fn env_js(State(state): State<AppState>) -> impl IntoResponse {
    (
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET"),
            (header::CONTENT_TYPE, "application/javascript"),
        ],
        state.env_script.to_string(),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn env_script_escapes_value() {
        let script = env_script(r#"https://x.example/"quoted""#);
        assert!(script.contains(r#"window.ENV_BACKEND_URL = "https://x.example/\"quoted\"";"#));
        assert!(script.contains("window.ENV_CONFIG_LOADED = true;"));
    }
}

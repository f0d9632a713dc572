//! Backend URL resolution and the webapp's env-loaded configuration.
//!
//! The backend base URL has exactly one of two sources: a value injected at
//! deploy time through `ENV_BACKEND_URL`, or the development fallback. The
//! choice is made once, when [`WebappConfig`] is loaded, and the resulting
//! [`FlowConfig`] is immutable for the life of the process.

use crate::utils::from_env::{EnvItemInfo, FromEnv, FromEnvErr, FromEnvVar};
use core::{fmt, str::FromStr};
use std::{num::ParseIntError, sync::LazyLock, time::Duration};
use tracing::warn;
use url::Url;

const ENV_BACKEND_URL: &str = "ENV_BACKEND_URL";
const BOT_DEEP_LINK: &str = "BOT_DEEP_LINK";
const REDIRECT_DELAY_MS: &str = "REDIRECT_DELAY_MS";
const REQUEST_TIMEOUT_MS: &str = "REQUEST_TIMEOUT_MS";
const INITIATE_METHOD: &str = "INITIATE_METHOD";
const WEBAPP_PORT: &str = "WEBAPP_PORT";

/// Value deployments leave in place when no backend has been configured.
pub const PLACEHOLDER_BACKEND_URL: &str = "PLACEHOLDER_BACKEND_URL";

/// Development backend used when nothing usable is injected.
pub const FALLBACK_BACKEND_URL: &str = "http://localhost:8000";

/// Where users are sent back to once they have connected their account.
pub const DEFAULT_BOT_DEEP_LINK: &str = "https://t.me/YOUR_BOT_USERNAME";

/// Pause between showing success and returning to Telegram.
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Upper bound on any single backend call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default listen port for the page server.
pub const DEFAULT_PORT: u16 = 3000;

static FALLBACK_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse(FALLBACK_BACKEND_URL).expect("valid fallback url"));

static DEFAULT_DEEP_LINK_URL: LazyLock<Url> =
    LazyLock::new(|| Url::parse(DEFAULT_BOT_DEEP_LINK).expect("valid deep link url"));

/// Where the resolved backend URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSource {
    /// Supplied by the deployment.
    Injected,
    /// The built-in development default.
    Fallback,
}

/// The backend base URL, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    url: Url,
    source: BackendSource,
}

impl ResolvedBackend {
    /// Resolve the backend URL from an injected value.
    ///
    /// The injected value wins when it is present, non-empty, not the
    /// [`PLACEHOLDER_BACKEND_URL`] sentinel, and parses as a URL. In every
    /// other case the [`FALLBACK_BACKEND_URL`] is used. Resolution never
    /// fails.
    pub fn resolve(injected: Option<&str>) -> Self {
        match injected.map(str::trim) {
            Some(value) if !value.is_empty() && value != PLACEHOLDER_BACKEND_URL => {
                match Url::parse(value) {
                    Ok(url) => Self::new(url, BackendSource::Injected),
                    Err(error) => {
                        warn!(%error, value, "injected backend url is invalid, using fallback");
                        Self::fallback()
                    }
                }
            }
            _ => Self::fallback(),
        }
    }

    /// The development fallback.
    pub fn fallback() -> Self {
        Self::new(FALLBACK_URL.clone(), BackendSource::Fallback)
    }

    fn new(mut url: Url, source: BackendSource) -> Self {
        // Keep any path prefix when endpoints are joined on.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Self { url, source }
    }

    /// The base URL, always ending in `/`.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Where the URL came from.
    pub const fn source(&self) -> BackendSource {
        self.source
    }

    /// The base URL without its trailing slash, as published to pages.
    pub fn as_published(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// Join an endpoint path (without leading slash) onto the base.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.url.join(path)
    }
}

/// HTTP method used to call the initiate endpoint. Older backends only
/// expose it as `GET ?user_id=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InitiateMethod {
    /// `POST` with a JSON body.
    #[default]
    Post,
    /// `GET` with a query parameter.
    Get,
}

/// Error parsing an [`InitiateMethod`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown initiate method {0:?}, expected GET or POST")]
pub struct InitiateMethodError(String);

impl FromStr for InitiateMethod {
    type Err = InitiateMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POST" => Ok(Self::Post),
            "GET" => Ok(Self::Get),
            _ => Err(InitiateMethodError(s.to_owned())),
        }
    }
}

impl fmt::Display for InitiateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => f.write_str("POST"),
            Self::Get => f.write_str("GET"),
        }
    }
}

impl FromEnvVar for InitiateMethod {
    type Error = InitiateMethodError;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        crate::utils::from_env::parse_env_if_present(env_var)
    }
}

/// Immutable settings handed to each [`AuthFlow`].
///
/// [`AuthFlow`]: crate::flow::AuthFlow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Backend base URL.
    pub backend: ResolvedBackend,
    /// Link back to the Telegram bot.
    pub deep_link: Url,
    /// Pause before the return redirect after a successful callback.
    pub redirect_delay: Duration,
    /// Timeout applied to every backend call.
    pub request_timeout: Duration,
    /// How the initiate endpoint is called.
    pub initiate_method: InitiateMethod,
}

impl FlowConfig {
    /// Settings with all defaults and the given backend.
    pub fn new(backend: ResolvedBackend) -> Self {
        Self {
            backend,
            deep_link: DEFAULT_DEEP_LINK_URL.clone(),
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            initiate_method: InitiateMethod::default(),
        }
    }
}

/// Errors loading [`WebappConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebappConfigError {
    /// `BOT_DEEP_LINK` is not a URL.
    #[error("invalid bot deep link: {0}")]
    DeepLink(url::ParseError),
    /// A millisecond duration did not parse.
    #[error("invalid duration: {0}")]
    Duration(ParseIntError),
    /// `WEBAPP_PORT` did not parse.
    #[error("invalid port: {0}")]
    Port(ParseIntError),
    /// `INITIATE_METHOD` is neither GET nor POST.
    #[error(transparent)]
    InitiateMethod(#[from] InitiateMethodError),
}

/// Everything the webapp reads from env at startup.
///
/// | Var | Default |
/// |---|---|
/// | `ENV_BACKEND_URL` | [`FALLBACK_BACKEND_URL`] (see [`ResolvedBackend::resolve`]) |
/// | `BOT_DEEP_LINK` | [`DEFAULT_BOT_DEEP_LINK`] |
/// | `REDIRECT_DELAY_MS` | 3000 |
/// | `REQUEST_TIMEOUT_MS` | 10000 |
/// | `INITIATE_METHOD` | `POST` |
/// | `WEBAPP_PORT` | 3000 |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebappConfig {
    /// Per-flow settings.
    pub flow: FlowConfig,
    /// The raw injected value, republished by `/api/env.js`.
    pub injected_backend: Option<String>,
    /// Listen port.
    pub port: u16,
}

impl FromEnv for WebappConfig {
    type Error = WebappConfigError;

    fn inventory() -> Vec<&'static EnvItemInfo> {
        vec![
            &EnvItemInfo {
                var: ENV_BACKEND_URL,
                description: "Backend base URL. Falls back to http://localhost:8000 when missing or left as PLACEHOLDER_BACKEND_URL.",
                optional: true,
            },
            &EnvItemInfo {
                var: BOT_DEEP_LINK,
                description: "Telegram link users are returned to after connecting.",
                optional: true,
            },
            &EnvItemInfo {
                var: REDIRECT_DELAY_MS,
                description: "Milliseconds to show success before returning to Telegram.",
                optional: true,
            },
            &EnvItemInfo {
                var: REQUEST_TIMEOUT_MS,
                description: "Timeout for each backend call, in milliseconds.",
                optional: true,
            },
            &EnvItemInfo {
                var: INITIATE_METHOD,
                description: "GET or POST, how /api/auth/initiate is called.",
                optional: true,
            },
            &EnvItemInfo {
                var: WEBAPP_PORT,
                description: "Port the page server listens on.",
                optional: true,
            },
        ]
    }

    fn from_env() -> Result<Self, FromEnvErr<Self::Error>> {
        let injected_backend = Option::<String>::from_env_var(ENV_BACKEND_URL)
            .map_err(FromEnvErr::infallible_into::<WebappConfigError>)?;
        let backend = ResolvedBackend::resolve(injected_backend.as_deref());

        let deep_link = Url::from_env_var_or(BOT_DEEP_LINK, DEFAULT_DEEP_LINK_URL.clone())
            .map_err(|e| e.map(WebappConfigError::DeepLink))?;
        let redirect_delay = Duration::from_env_var_or(REDIRECT_DELAY_MS, DEFAULT_REDIRECT_DELAY)
            .map_err(|e| e.map(WebappConfigError::Duration))?;
        let request_timeout =
            Duration::from_env_var_or(REQUEST_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT)
                .map_err(|e| e.map(WebappConfigError::Duration))?;
        let initiate_method = InitiateMethod::from_env_var_or(INITIATE_METHOD, Default::default())
            .map_err(|e| e.map(WebappConfigError::InitiateMethod))?;
        let port = u16::from_env_var_or(WEBAPP_PORT, DEFAULT_PORT)
            .map_err(|e| e.map(WebappConfigError::Port))?;

        Ok(Self {
            flow: FlowConfig {
                backend,
                deep_link,
                redirect_delay,
                request_timeout,
                initiate_method,
            },
            injected_backend,
            port,
        })
    }
}

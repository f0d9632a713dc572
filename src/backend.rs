//! Client for the backend's `/api/auth/*` endpoints.
//!
//! The backend owns token exchange and credential storage. This module only
//! knows the request and response shapes the page needs.

use crate::{
    config::{InitiateMethod, ResolvedBackend},
    params::UserId,
    utils::metrics::BACKEND_CALLS,
};
use async_trait::async_trait;
use oauth2::AuthorizationCode;
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const INITIATE: &str = "api/auth/initiate";
const CALLBACK: &str = "api/auth/callback";
const NOTIFY: &str = "api/auth/notify";
const STATUS: &str = "api/auth/status";

/// Errors talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Http {
        /// Response status.
        status: StatusCode,
        /// Response body, as text.
        body: String,
    },
    /// The request never got a response.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// No response within the configured timeout.
    #[error("no response after {0:?}")]
    Timeout(Duration),
    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// An endpoint URL could not be built from the base.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// True if the backend answered but the answer was unusable.
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// Response of the initiate endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateResponse {
    /// Provider authorization URL to send the browser to.
    pub auth_url: url::Url,
}

/// Response of the callback endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponse {
    /// Address of the connected Google account.
    pub email: String,
}

/// Response of the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether stored, unexpired credentials exist.
    pub authenticated: bool,
    /// Address of the connected account, when authenticated.
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
struct UserBody {
    user_id: UserId,
}

#[derive(Serialize)]
struct CallbackBody<'a> {
    code: &'a str,
    user_id: UserId,
}

/// The backend operations the page flow depends on.
#[async_trait]
pub trait AuthBackend: Send + Sync + core::fmt::Debug {
    /// Start an authorization for the user, returning where to send them.
    async fn initiate(&self, user_id: UserId) -> Result<InitiateResponse, BackendError>;

    /// Exchange the provider's code for stored credentials.
    async fn complete_callback(
        &self,
        code: &AuthorizationCode,
        user_id: UserId,
    ) -> Result<CallbackResponse, BackendError>;

    /// Ask the backend to tell the bot the user has connected.
    async fn notify(&self, user_id: UserId) -> Result<(), BackendError>;

    /// Check whether the user is already connected.
    async fn status(&self, user_id: UserId) -> Result<AuthStatus, BackendError>;
}

/// [`AuthBackend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: ResolvedBackend,
    initiate_method: InitiateMethod,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a client for the given backend.
    pub fn new(base: ResolvedBackend, initiate_method: InitiateMethod) -> Self {
        Self::with_client(base, initiate_method, reqwest::Client::new())
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub const fn with_client(
        base: ResolvedBackend,
        initiate_method: InitiateMethod,
        client: reqwest::Client,
    ) -> Self {
        Self {
            base,
            initiate_method,
            client,
        }
    }

    /// The backend this client talks to.
    pub const fn base(&self) -> &ResolvedBackend {
        &self.base
    }

    async fn send(&self, endpoint: &'static str, req: RequestBuilder) -> Result<String, BackendError> {
        let res = Self::send_inner(req).await;
        let result = if res.is_ok() { "ok" } else { "error" };
        metrics::counter!(BACKEND_CALLS, "endpoint" => endpoint, "result" => result).increment(1);
        res.inspect_err(|error| warn!(endpoint, %error, "backend call failed"))
    }

    async fn send_inner(req: RequestBuilder) -> Result<String, BackendError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(BackendError::Http { status, body })
        }
    }

    fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
        serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    #[instrument(skip_all, fields(%user_id, method = %self.initiate_method))]
    async fn initiate(&self, user_id: UserId) -> Result<InitiateResponse, BackendError> {
        let url = self.base.endpoint(INITIATE)?;
        let req = match self.initiate_method {
            InitiateMethod::Post => self.client.post(url).json(&UserBody { user_id }),
            InitiateMethod::Get => self.client.get(url).query(&UserBody { user_id }),
        };
        let body = self.send("initiate", req).await?;
        Self::decode(&body)
    }

    #[instrument(skip_all, fields(%user_id))]
    async fn complete_callback(
        &self,
        code: &AuthorizationCode,
        user_id: UserId,
    ) -> Result<CallbackResponse, BackendError> {
        let url = self.base.endpoint(CALLBACK)?;
        let req = self.client.post(url).json(&CallbackBody {
            code: code.secret(),
            user_id,
        });
        let body = self.send("callback", req).await?;
        Self::decode(&body)
    }

    #[instrument(skip_all, fields(%user_id))]
    async fn notify(&self, user_id: UserId) -> Result<(), BackendError> {
        let url = self.base.endpoint(NOTIFY)?;
        self.send("notify", self.client.post(url).json(&UserBody { user_id }))
            .await?;
        debug!("bot notified");
        Ok(())
    }

    #[instrument(skip_all, fields(%user_id))]
    async fn status(&self, user_id: UserId) -> Result<AuthStatus, BackendError> {
        let url = self.base.endpoint(&format!("{STATUS}/{user_id}"))?;
        let body = self.send("status", self.client.get(url)).await?;
        Self::decode(&body)
    }
}

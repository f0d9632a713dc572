#![allow(dead_code)]

use async_trait::async_trait;
use oauth2::AuthorizationCode;
use reqwest::StatusCode;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};
use tg_oauth_webapp::{
    backend::{AuthBackend, AuthStatus, BackendError, CallbackResponse, InitiateResponse},
    config::{FlowConfig, ResolvedBackend},
    flow::AuthFlow,
    params::UserId,
};

/// How a scripted endpoint answers.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Delayed(Duration, T),
    Fail,
    FailAfter(Duration),
    Malformed,
    Hang,
    Panic,
}

fn server_error() -> BackendError {
    BackendError::Http {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "boom".into(),
    }
}

impl<T: Clone> Reply<T> {
    async fn resolve(&self) -> Result<T, BackendError> {
        match self {
            Self::Ok(v) => Ok(v.clone()),
            Self::Delayed(d, v) => {
                tokio::time::sleep(*d).await;
                Ok(v.clone())
            }
            Self::Fail => Err(server_error()),
            Self::FailAfter(d) => {
                tokio::time::sleep(*d).await;
                Err(server_error())
            }
            Self::Malformed => Err(BackendError::Malformed("missing field".into())),
            Self::Hang => std::future::pending().await,
            Self::Panic => panic!("scripted panic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initiate(UserId),
    Callback { code: String, user_id: UserId },
    Notify(UserId),
    Status(UserId),
}

/// An [`AuthBackend`] answering from a script and recording every call.
#[derive(Debug)]
pub struct MockBackend {
    pub initiate: Reply<InitiateResponse>,
    /// Answers for successive initiate calls, used before `initiate`.
    pub initiate_queue: Mutex<VecDeque<Reply<InitiateResponse>>>,
    pub callback: Reply<CallbackResponse>,
    pub notify: Reply<()>,
    pub status: Reply<AuthStatus>,
    pub calls: Mutex<Vec<Call>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            initiate: Reply::Ok(InitiateResponse {
                auth_url: AUTH_URL.parse().unwrap(),
            }),
            callback: Reply::Ok(CallbackResponse {
                email: "a@b.com".into(),
            }),
            initiate_queue: Mutex::default(),
            notify: Reply::Ok(()),
            status: Reply::Ok(AuthStatus {
                authenticated: false,
                email: None,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }
}

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth?state=42";
pub const DEEP_LINK: &str = "https://t.me/YOUR_BOT_USERNAME";

impl MockBackend {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn connected(email: &str) -> Self {
        Self {
            status: Reply::Ok(AuthStatus {
                authenticated: true,
                email: Some(email.into()),
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn initiate(&self, user_id: UserId) -> Result<InitiateResponse, BackendError> {
        self.record(Call::Initiate(user_id));
        let queued = self.initiate_queue.lock().unwrap().pop_front();
        match queued {
            Some(reply) => reply.resolve().await,
            None => self.initiate.resolve().await,
        }
    }

    async fn complete_callback(
        &self,
        code: &AuthorizationCode,
        user_id: UserId,
    ) -> Result<CallbackResponse, BackendError> {
        self.record(Call::Callback {
            code: code.secret().clone(),
            user_id,
        });
        self.callback.resolve().await
    }

    async fn notify(&self, user_id: UserId) -> Result<(), BackendError> {
        self.record(Call::Notify(user_id));
        self.notify.resolve().await
    }

    async fn status(&self, user_id: UserId) -> Result<AuthStatus, BackendError> {
        self.record(Call::Status(user_id));
        self.status.resolve().await
    }
}

pub fn config() -> Arc<FlowConfig> {
    Arc::new(FlowConfig::new(ResolvedBackend::fallback()))
}

pub fn flow(backend: MockBackend) -> (AuthFlow, Arc<MockBackend>) {
    let backend = Arc::new(backend);
    (AuthFlow::new(config(), backend.clone()), backend)
}

//! The page's authorization flow.
//!
//! Each page load gets one [`AuthFlow`]. It inspects the query once, takes
//! exactly one of three paths (fresh visit, provider callback, or a status
//! check that finds the user already connected), and reflects every step on
//! its [`Page`].
//!
//! All state lives in a single [`FlowState`]. The only way to change it is
//! [`FlowState::next`], which rejects events that do not apply to the
//! current state. This is what keeps the paths mutually exclusive: a status
//! check result cannot land on a page that is already redirecting, a late
//! initiate response cannot replace an error, and so on.

use crate::{
    backend::{AuthBackend, BackendError},
    config::FlowConfig,
    page::{Navigation, Page, StatusKind},
    params::{Callback, Entry, PageParams, UserId},
    task::Detached,
    utils::metrics::FLOW_OUTCOMES,
};
use futures_util::FutureExt;
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const MSG_MISSING_ID: &str = "❌ User ID not found. Please start from Telegram bot.";
const MSG_INITIATING: &str = "🔄 Redirecting to Google...";
const MSG_INITIATE_FAILED: &str = "❌ Failed to connect. Please try again.";
const MSG_COMPLETING: &str = "🔄 Completing authorization...";
const MSG_CALLBACK_FAILED: &str = "❌ Failed to complete authorization. Please try again.";
const MSG_FAULT: &str = "❌ An error occurred. Please refresh and try again.";

/// Why a flow ended in error. Every kind is displayed the same way; the
/// distinction is for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowErrorKind {
    /// No usable `user_id` on a fresh visit.
    MissingIdentifier,
    /// The provider redirected back with an `error`.
    ProviderDenied,
    /// A backend call failed, returned non-2xx, or timed out.
    Network,
    /// A backend call succeeded with an unusable body.
    Malformed,
    /// The flow panicked.
    Fault,
}

impl FlowErrorKind {
    /// Metric label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingIdentifier => "missing_identifier",
            Self::ProviderDenied => "provider_denied",
            Self::Network => "network",
            Self::Malformed => "malformed",
            Self::Fault => "fault",
        }
    }
}

impl From<&BackendError> for FlowErrorKind {
    fn from(err: &BackendError) -> Self {
        if err.is_malformed() {
            Self::Malformed
        } else {
            Self::Network
        }
    }
}

/// The call a [`FlowState::Loading`] page is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingStage {
    /// Waiting for the authorization URL.
    Initiating {
        /// Who is signing in.
        user_id: UserId,
    },
    /// Waiting for the backend to exchange the code.
    CompletingCallback {
        /// Who the code belongs to.
        user_id: UserId,
    },
}

/// How a flow reached [`FlowState::Success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessOrigin {
    /// The provider callback just completed.
    Callback,
    /// The status check found stored credentials.
    AlreadyConnected,
}

/// Where a page is in its flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    /// Nothing has happened yet.
    Unstarted,
    /// The user can press sign-in.
    AwaitingUserAction {
        /// Who the page is for.
        user_id: UserId,
    },
    /// A backend call is in flight.
    Loading(LoadingStage),
    /// The page is leaving for the provider.
    Redirecting {
        /// Provider authorization URL.
        auth_url: Url,
    },
    /// Connected.
    Success {
        /// Address of the connected account.
        email: String,
        /// How the flow got here.
        origin: SuccessOrigin,
    },
    /// Failed.
    Error {
        /// Why.
        kind: FlowErrorKind,
        /// What the user sees.
        message: String,
        /// Set when pressing sign-in again starts a new attempt.
        retry_as: Option<UserId>,
    },
}

/// Something that happened to a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// Fresh visit without a usable id.
    IdentifierMissing,
    /// Fresh visit with an id.
    IdentifierFound(UserId),
    /// The status check found the user connected.
    AlreadyAuthenticated {
        /// Stored account address.
        email: String,
    },
    /// The user pressed sign-in.
    SignInClicked,
    /// The initiate call returned.
    AuthUrlReceived(Url),
    /// The provider redirected back with a usable code.
    CallbackReceived(UserId),
    /// The provider redirected back with an error.
    ProviderDenied(String),
    /// The callback call returned.
    CallbackCompleted {
        /// Connected account address.
        email: String,
    },
    /// The pending backend call failed.
    CallFailed(FlowErrorKind),
    /// The flow panicked.
    Fault,
}

impl FlowState {
    /// The state after `event`, or [`None`] if the event does not apply.
    pub fn next(&self, event: &FlowEvent) -> Option<Self> {
        use FlowEvent as E;
        use FlowState as S;

        let next = match (self, event) {
            (_, E::Fault) => S::Error {
                kind: FlowErrorKind::Fault,
                message: MSG_FAULT.to_owned(),
                retry_as: None,
            },

            (S::Unstarted, E::IdentifierMissing) => S::Error {
                kind: FlowErrorKind::MissingIdentifier,
                message: MSG_MISSING_ID.to_owned(),
                retry_as: None,
            },
            (S::Unstarted, E::IdentifierFound(user_id)) => {
                S::AwaitingUserAction { user_id: *user_id }
            }
            (S::AwaitingUserAction { .. }, E::AlreadyAuthenticated { email }) => S::Success {
                email: email.clone(),
                origin: SuccessOrigin::AlreadyConnected,
            },

            (S::AwaitingUserAction { user_id }, E::SignInClicked)
            | (S::Loading(LoadingStage::Initiating { user_id }), E::SignInClicked)
            | (
                S::Error {
                    retry_as: Some(user_id),
                    ..
                },
                E::SignInClicked,
            ) => S::Loading(LoadingStage::Initiating { user_id: *user_id }),
            (S::Loading(LoadingStage::Initiating { .. }), E::AuthUrlReceived(url)) => {
                S::Redirecting {
                    auth_url: url.clone(),
                }
            }
            (S::Loading(LoadingStage::Initiating { user_id }), E::CallFailed(kind)) => S::Error {
                kind: *kind,
                message: MSG_INITIATE_FAILED.to_owned(),
                retry_as: Some(*user_id),
            },

            (S::Unstarted, E::ProviderDenied(reason)) => S::Error {
                kind: FlowErrorKind::ProviderDenied,
                message: format!("❌ Authorization cancelled: {reason}"),
                retry_as: None,
            },
            (S::Unstarted, E::CallbackReceived(user_id)) => {
                S::Loading(LoadingStage::CompletingCallback { user_id: *user_id })
            }
            (S::Loading(LoadingStage::CompletingCallback { .. }), E::CallbackCompleted { email }) => {
                S::Success {
                    email: email.clone(),
                    origin: SuccessOrigin::Callback,
                }
            }
            (S::Loading(LoadingStage::CompletingCallback { .. }), E::CallFailed(kind)) => S::Error {
                kind: *kind,
                message: MSG_CALLBACK_FAILED.to_owned(),
                retry_as: None,
            },

            _ => return None,
        };
        Some(next)
    }

    /// The status line this state shows, if it shows one.
    pub fn status(&self) -> Option<(StatusKind, String)> {
        match self {
            Self::Unstarted | Self::AwaitingUserAction { .. } => None,
            Self::Loading(LoadingStage::Initiating { .. }) | Self::Redirecting { .. } => {
                Some((StatusKind::Loading, MSG_INITIATING.to_owned()))
            }
            Self::Loading(LoadingStage::CompletingCallback { .. }) => {
                Some((StatusKind::Loading, MSG_COMPLETING.to_owned()))
            }
            Self::Success {
                email,
                origin: SuccessOrigin::Callback,
            } => Some((
                StatusKind::Success,
                format!("✅ Successfully connected!\n📧 {email}\n\nYou can now return to Telegram."),
            )),
            Self::Success {
                email,
                origin: SuccessOrigin::AlreadyConnected,
            } => Some((
                StatusKind::Success,
                format!("✅ Already connected!\n📧 {email}\n\nYou can return to Telegram."),
            )),
            Self::Error { message, .. } => Some((StatusKind::Error, message.clone())),
        }
    }

    /// The user a sign-in press would act for, if the control is live.
    pub const fn sign_in_user(&self) -> Option<UserId> {
        match self {
            Self::AwaitingUserAction { user_id }
            | Self::Loading(LoadingStage::Initiating { user_id })
            | Self::Error {
                retry_as: Some(user_id),
                ..
            } => Some(*user_id),
            _ => None,
        }
    }

    /// True while a backend call is pending or the page is navigating away.
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Loading(_) | Self::Redirecting { .. })
    }

    fn record_outcome(&self) {
        let (outcome, kind) = match self {
            Self::Redirecting { .. } => ("redirected", "none"),
            Self::Success {
                origin: SuccessOrigin::Callback,
                ..
            } => ("connected", "none"),
            Self::Success {
                origin: SuccessOrigin::AlreadyConnected,
                ..
            } => ("already_connected", "none"),
            Self::Error { kind, .. } => ("error", kind.as_str()),
            _ => return,
        };
        metrics::counter!(FLOW_OUTCOMES, "outcome" => outcome, "kind" => kind).increment(1);
    }
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| BackendError::Timeout(limit))?
}

/// Drives one page load through its flow.
#[derive(Debug)]
pub struct AuthFlow {
    config: Arc<FlowConfig>,
    backend: Arc<dyn AuthBackend>,
    page: Page,
    state: Mutex<FlowState>,
}

impl AuthFlow {
    /// A flow in [`FlowState::Unstarted`] over a blank page.
    pub fn new(config: Arc<FlowConfig>, backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            config,
            backend,
            page: Page::new(),
            state: Mutex::new(FlowState::Unstarted),
        }
    }

    /// The page this flow renders to.
    pub const fn page(&self) -> &Page {
        &self.page
    }

    /// The settings this flow was built with.
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// A copy of the current state.
    pub fn state(&self) -> FlowState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `event` and render the result. Returns the new state, or
    /// [`None`] if the event was rejected and nothing changed.
    ///
    /// The page is updated while the state lock is held, so the page always
    /// shows the latest accepted state.
    pub fn apply(&self, event: FlowEvent) -> Option<FlowState> {
        let mut state = self.lock();
        let Some(next) = state.next(&event) else {
            warn!(state = ?*state, ?event, "ignoring event");
            return None;
        };
        debug!(from = ?*state, to = ?next, "flow transition");
        *state = next.clone();
        self.render(&next);
        next.record_outcome();
        Some(next)
    }

    fn render(&self, state: &FlowState) {
        if let Some((kind, message)) = state.status() {
            self.page.show_status(kind, message);
        }
        self.page.set_spinner(state.is_busy());

        match state {
            FlowState::Redirecting { auth_url } => {
                self.page.navigate(Navigation::Now(auth_url.clone()));
            }
            FlowState::Success { origin, .. } => {
                self.page.set_sign_in_visible(false);
                if *origin == SuccessOrigin::Callback {
                    self.page.navigate(Navigation::After {
                        url: self.config.deep_link.clone(),
                        delay: self.config.redirect_delay,
                    });
                }
            }
            _ => {}
        }
    }

    /// Put the flow straight into [`FlowState::AwaitingUserAction`], as a
    /// page that has already loaded for `user_id` would be. Used when the
    /// sign-in press arrives as its own request.
    pub fn await_user(&self, user_id: UserId) -> bool {
        self.apply(FlowEvent::IdentifierFound(user_id)).is_some()
    }

    /// Handle a page load. Returns the best-effort notify task when a
    /// callback completed.
    #[instrument(skip_all, fields(callback = params.is_callback()))]
    pub async fn load(&self, params: &PageParams) -> Option<Detached> {
        match params.entry() {
            Entry::Fresh(None) => {
                info!("page loaded without a user id");
                self.apply(FlowEvent::IdentifierMissing);
                None
            }
            Entry::Fresh(Some(user_id)) => {
                self.apply(FlowEvent::IdentifierFound(user_id));
                self.check_status(user_id).await;
                None
            }
            Entry::Denied(reason) => {
                info!(%reason, "provider denied authorization");
                self.apply(FlowEvent::ProviderDenied(reason));
                None
            }
            Entry::NotACallback => {
                debug!("incomplete callback parameters, nothing to do");
                None
            }
            Entry::Callback(callback) => self.complete_callback(callback).await,
        }
    }

    #[instrument(skip(self))]
    async fn check_status(&self, user_id: UserId) {
        let limit = self.config.request_timeout;
        match with_timeout(limit, self.backend.status(user_id)).await {
            Ok(status) if status.authenticated => match status.email {
                Some(email) => {
                    self.apply(FlowEvent::AlreadyAuthenticated { email });
                }
                None => warn!("status reports authenticated without an email, ignoring"),
            },
            Ok(_) => debug!("user not connected yet"),
            Err(error) => warn!(%error, "status check failed, leaving sign-in available"),
        }
    }

    /// Handle a sign-in press: fetch the authorization URL and navigate to
    /// it. Presses in states that have no sign-in control are ignored.
    #[instrument(skip_all)]
    pub async fn sign_in(&self) {
        let Some(FlowState::Loading(LoadingStage::Initiating { user_id })) =
            self.apply(FlowEvent::SignInClicked)
        else {
            return;
        };

        let limit = self.config.request_timeout;
        match with_timeout(limit, self.backend.initiate(user_id)).await {
            Ok(resp) => {
                let auth_url = resp.auth_url.clone();
                if self.apply(FlowEvent::AuthUrlReceived(resp.auth_url)).is_some() {
                    info!(%user_id, "redirecting to provider");
                } else {
                    // an earlier press already settled the flow
                    debug!(%user_id, %auth_url, "dropping late auth url");
                }
            }
            Err(error) => {
                let kind = FlowErrorKind::from(&error);
                error!(%user_id, ?kind, %error, "failed to initiate authorization");
                self.apply(FlowEvent::CallFailed(kind));
            }
        }
    }

    #[instrument(skip_all, fields(user_id = %callback.user_id))]
    async fn complete_callback(&self, callback: Callback) -> Option<Detached> {
        let Callback { code, user_id } = callback;
        self.apply(FlowEvent::CallbackReceived(user_id))?;

        let limit = self.config.request_timeout;
        match with_timeout(limit, self.backend.complete_callback(&code, user_id)).await {
            Ok(resp) => {
                info!(email = %resp.email, "authorization completed");
                self.apply(FlowEvent::CallbackCompleted { email: resp.email })?;
                Some(self.notify(user_id))
            }
            Err(error) => {
                let kind = FlowErrorKind::from(&error);
                error!(?kind, %error, "failed to complete authorization");
                self.apply(FlowEvent::CallFailed(kind));
                None
            }
        }
    }

    fn notify(&self, user_id: UserId) -> Detached {
        let backend = Arc::clone(&self.backend);
        let limit = self.config.request_timeout;
        Detached::spawn("notify bot", async move {
            with_timeout(limit, backend.notify(user_id)).await
        })
    }

    /// Force the error state, clearing any spinner.
    pub fn fault(&self) {
        self.apply(FlowEvent::Fault);
    }

    /// Run `fut` under the failure guard. A panic puts the flow into the
    /// fault error state and yields [`None`].
    pub async fn guarded<F: Future>(&self, fut: F) -> Option<F::Output> {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(out) => Some(out),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(%reason, "flow panicked");
                self.fault();
                None
            }
        }
    }

    /// [`Self::load`] under the failure guard.
    pub async fn run_load(&self, params: &PageParams) -> Option<Detached> {
        self.guarded(self.load(params)).await.flatten()
    }

    /// [`Self::sign_in`] under the failure guard.
    pub async fn run_sign_in(&self) {
        self.guarded(self.sign_in()).await;
    }
}

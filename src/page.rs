//! The display surface a flow writes to, and its HTML rendering.

use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use url::Url;

/// Display class of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// A call is in flight.
    Loading,
    /// Connected.
    Success,
    /// Something went wrong.
    Error,
}

impl StatusKind {
    /// CSS class for the status element.
    pub const fn class(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// True for success and error.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Loading)
    }
}

/// A status line shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Display class.
    pub kind: StatusKind,
    /// Human-readable text. May contain newlines.
    pub message: String,
}

/// A navigation the page has been told to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Leave the page right away.
    Now(Url),
    /// Leave the page after a fixed pause.
    After {
        /// Destination.
        url: Url,
        /// Pause before leaving.
        delay: Duration,
    },
}

impl Navigation {
    /// The destination.
    pub const fn url(&self) -> &Url {
        match self {
            Self::Now(url) | Self::After { url, .. } => url,
        }
    }
}

/// Everything visible on the page at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    /// Current status, if any has been shown.
    pub status: Option<Status>,
    /// Whether the loading spinner is active.
    pub spinner: bool,
    /// Whether the sign-in control is shown.
    pub sign_in_visible: bool,
    /// Pending navigation, if any.
    pub navigation: Option<Navigation>,
}

impl Default for PageView {
    fn default() -> Self {
        Self {
            status: None,
            spinner: false,
            sign_in_visible: true,
            navigation: None,
        }
    }
}

/// The page a flow drives. Each update replaces one field of the
/// [`PageView`] whole, under a lock, so readers never see a half-written
/// status.
#[derive(Debug, Default)]
pub struct Page {
    view: Mutex<PageView>,
}

impl Page {
    /// A blank page with the sign-in control showing.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PageView> {
        // A panicking writer cannot leave a field half-written, so the data
        // is still usable.
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the status line.
    pub fn show_status(&self, kind: StatusKind, message: impl Into<String>) {
        self.lock().status = Some(Status {
            kind,
            message: message.into(),
        });
    }

    /// Turn the spinner on or off.
    pub fn set_spinner(&self, active: bool) {
        self.lock().spinner = active;
    }

    /// Show or hide the sign-in control.
    pub fn set_sign_in_visible(&self, visible: bool) {
        self.lock().sign_in_visible = visible;
    }

    /// Record a navigation away from the page.
    pub fn navigate(&self, navigation: Navigation) {
        self.lock().navigation = Some(navigation);
    }

    /// A copy of what is currently shown.
    pub fn snapshot(&self) -> PageView {
        self.lock().clone()
    }
}

const STYLE: &str = "\
body{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;\
display:flex;justify-content:center;align-items:center;min-height:100vh;margin:0;background:#f5f5f5}\
.container{background:#fff;padding:40px;border-radius:12px;box-shadow:0 2px 10px rgba(0,0,0,.1);\
text-align:center;max-width:400px}\
.status{white-space:pre-line;margin-top:20px}.status.success{color:#2e7d32}\
.status.error{color:#c62828}.status.loading{color:#555}\
.spinner{display:none}.spinner.active{display:block;margin:20px auto;width:32px;height:32px;\
border:4px solid #eee;border-top-color:#4285f4;border-radius:50%;animation:spin 1s linear infinite}\
@keyframes spin{to{transform:rotate(360deg)}}\
button{background:#4285f4;color:#fff;border:0;border-radius:6px;padding:12px 24px;font-size:16px;cursor:pointer}";

impl PageView {
    /// Render the view as a full HTML document.
    ///
    /// `sign_in_user` is the id carried by the sign-in form. Without one the
    /// control is rendered disabled.
    pub fn render_html(&self, sign_in_user: Option<&str>) -> String {
        let refresh = self.navigation.as_ref().map(|nav| {
            let secs = match nav {
                Navigation::Now(_) => 0,
                Navigation::After { delay, .. } => delay.as_secs_f64().ceil() as u64,
            };
            format!("{secs};url={}", nav.url())
        });
        let spinner = if self.spinner { "spinner active" } else { "spinner" };

        let markup = html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    meta name="viewport" content="width=device-width, initial-scale=1";
                    @if let Some(refresh) = &refresh {
                        meta http-equiv="refresh" content=(refresh);
                    }
                    title { "Connect Google" }
                    style { (PreEscaped(STYLE)) }
                }
                body {
                    div class="container" {
                        h1 { "Connect your Google account" }
                        @if self.sign_in_visible {
                            (sign_in_control(sign_in_user))
                        }
                        div id="spinner" class=(spinner) {}
                        @match &self.status {
                            Some(status) => div id="status" class={ "status " (status.kind.class()) } {
                                (status.message)
                            },
                            None => div id="status" class="status" {},
                        }
                    }
                }
            }
        };

        markup.into_string()
    }
}

fn sign_in_control(user_id: Option<&str>) -> Markup {
    html! {
        @match user_id {
            Some(user_id) => form method="post" action="/signin" {
                input type="hidden" name="user_id" value=(user_id);
                button id="googleSignIn" type="submit" { "Sign in with Google" }
            },
            None => button id="googleSignIn" type="button" disabled { "Sign in with Google" },
        }
    }
}

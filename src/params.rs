//! Query parameters a page load arrives with, and how they select a flow.

use core::{fmt, str::FromStr};
use oauth2::AuthorizationCode;
use serde::{Deserialize, Serialize};

/// The Telegram user id correlating this page with a bot conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Wrap a raw id.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UserId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Raw query string of a page load. Every field is kept verbatim; parsing
/// happens in [`PageParams::entry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageParams {
    /// Set by the bot's deep link.
    pub user_id: Option<String>,
    /// Authorization code, set by the provider on redirect.
    pub code: Option<String>,
    /// Echo of the user id, set by the provider on redirect.
    pub state: Option<String>,
    /// Provider-reported denial.
    pub error: Option<String>,
}

/// A completed authorization, ready to hand to the backend.
#[derive(Debug)]
pub struct Callback {
    /// The authorization code. Its `Debug` output is redacted.
    pub code: AuthorizationCode,
    /// The user the code belongs to, recovered from `state`.
    pub user_id: UserId,
}

/// Which flow a page load takes. Exactly one is chosen per load.
#[derive(Debug)]
pub enum Entry {
    /// No `code`: a visit from the bot. `None` if the id is absent or not
    /// numeric.
    Fresh(Option<UserId>),
    /// Provider redirect carrying a denial.
    Denied(String),
    /// Provider redirect carrying a usable code.
    Callback(Callback),
    /// `code` is present but the redirect is unusable. Nothing is shown.
    NotACallback,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl PageParams {
    /// Read params from a raw query string. The first value of a repeated
    /// key wins and unknown keys are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "user_id" => &mut params.user_id,
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.into_owned());
        }
        params
    }

    /// Build params for a fresh visit.
    pub fn fresh(user_id: impl ToString) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        }
    }

    /// Build params for a provider redirect.
    pub fn callback(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Default::default()
        }
    }

    /// True if the `code` key is present at all, even empty.
    pub const fn is_callback(&self) -> bool {
        self.code.is_some()
    }

    /// Classify this load.
    ///
    /// The presence of `code` alone decides between the callback and fresh
    /// branches. Within the callback branch a non-empty `error` wins, then a
    /// missing code or state makes the load a silent no-op.
    pub fn entry(&self) -> Entry {
        if !self.is_callback() {
            let user_id = non_empty(&self.user_id).and_then(|id| id.parse().ok());
            return Entry::Fresh(user_id);
        }

        if let Some(error) = non_empty(&self.error) {
            return Entry::Denied(error.to_owned());
        }

        match (non_empty(&self.code), non_empty(&self.state)) {
            (Some(code), Some(state)) => match state.parse() {
                Ok(user_id) => Entry::Callback(Callback {
                    code: AuthorizationCode::new(code.to_owned()),
                    user_id,
                }),
                Err(_) => Entry::NotACallback,
            },
            _ => Entry::NotACallback,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn query_keeps_first_value() {
        let p = PageParams::from_query("user_id=42&user_id=7&scope=email");
        assert_eq!(p, PageParams::fresh(42));

        let p = PageParams::from_query("code=4%2Fabc&state=42&state=x&error=");
        assert_eq!(p.code.as_deref(), Some("4/abc"));
        assert_eq!(p.state.as_deref(), Some("42"));
        assert_eq!(p.error.as_deref(), Some(""));

        assert_eq!(PageParams::from_query(""), PageParams::default());
    }

    fn params(query: &[(&str, &str)]) -> PageParams {
        let mut p = PageParams::default();
        for (k, v) in query {
            let v = Some(v.to_string());
            match *k {
                "user_id" => p.user_id = v,
                "code" => p.code = v,
                "state" => p.state = v,
                "error" => p.error = v,
                _ => unreachable!(),
            }
        }
        p
    }

    #[test]
    fn fresh_visits() {
        assert!(matches!(
            params(&[("user_id", "42")]).entry(),
            Entry::Fresh(Some(id)) if id.get() == 42
        ));
        assert!(matches!(params(&[]).entry(), Entry::Fresh(None)));
        assert!(matches!(params(&[("user_id", "")]).entry(), Entry::Fresh(None)));
        assert!(matches!(params(&[("user_id", "abc")]).entry(), Entry::Fresh(None)));
        // a denial without a code is not a callback
        assert!(matches!(
            params(&[("error", "access_denied")]).entry(),
            Entry::Fresh(None)
        ));
    }

    #[test]
    fn denial_wins_over_code() {
        let entry = params(&[("code", "c"), ("state", "1"), ("error", "access_denied")]).entry();
        assert!(matches!(entry, Entry::Denied(e) if e == "access_denied"));
    }

    #[test]
    fn empty_error_is_ignored() {
        let entry = params(&[("code", "c"), ("state", "1"), ("error", "")]).entry();
        assert!(matches!(entry, Entry::Callback(_)));
    }

    #[test]
    fn incomplete_redirects_are_noops() {
        assert!(matches!(params(&[("code", "")]).entry(), Entry::NotACallback));
        assert!(matches!(params(&[("code", "c")]).entry(), Entry::NotACallback));
        assert!(matches!(
            params(&[("code", "c"), ("state", "nope")]).entry(),
            Entry::NotACallback
        ));
    }

    #[test]
    fn callback_keeps_code_and_state() {
        let Entry::Callback(cb) = PageParams::callback("4/abc", "99").entry() else {
            panic!("expected callback");
        };
        assert_eq!(cb.code.secret(), "4/abc");
        assert_eq!(cb.user_id, UserId::new(99));
    }
}

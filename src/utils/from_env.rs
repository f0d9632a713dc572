use std::{convert::Infallible, env::VarError, num::ParseIntError, str::FromStr};

/// Details about an environment variable. Used to document the variables a
/// config type reads, and by [`FromEnv::check_inventory`] to report the ones
/// that are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvItemInfo {
    /// The environment variable name.
    pub var: &'static str,
    /// A description of what the variable configures.
    pub description: &'static str,
    /// Whether the environment variable is optional or not.
    pub optional: bool,
}

/// Error type for loading from the environment. See the [`FromEnv`] trait for
/// more information.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FromEnvErr<Inner> {
    /// The environment variable is missing.
    #[error("Error reading variable {0}: {1}")]
    EnvError(String, VarError),
    /// The environment variable is empty.
    #[error("Environment variable {0} is empty")]
    Empty(String),
    /// The environment variable is present, but the value could not be parsed.
    #[error("Failed to parse environment variable {0}")]
    ParseError(#[from] Inner),
}

impl FromEnvErr<Infallible> {
    /// Convert the error into another error type.
    pub fn infallible_into<T>(self) -> FromEnvErr<T> {
        match self {
            Self::EnvError(s, e) => FromEnvErr::EnvError(s, e),
            Self::Empty(s) => FromEnvErr::Empty(s),
            Self::ParseError(_) => unreachable!(),
        }
    }
}

impl<Inner> FromEnvErr<Inner> {
    /// Map the error to another type, keeping the variable information
    /// intact.
    pub fn map<New>(self, f: impl FnOnce(Inner) -> New) -> FromEnvErr<New> {
        match self {
            Self::EnvError(s, e) => FromEnvErr::EnvError(s, e),
            Self::Empty(s) => FromEnvErr::Empty(s),
            Self::ParseError(e) => FromEnvErr::ParseError(f(e)),
        }
    }

    /// True if the variable was absent or empty, rather than malformed.
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::EnvError(..) | Self::Empty(_))
    }

    /// Missing env var.
    pub fn env_err(var: &str, e: VarError) -> Self {
        Self::EnvError(var.to_string(), e)
    }

    /// Empty env var.
    pub fn empty(var: &str) -> Self {
        Self::Empty(var.to_string())
    }

    /// Error while parsing.
    pub const fn parse_error(err: Inner) -> Self {
        Self::ParseError(err)
    }
}

/// Convenience function for parsing a value from the environment, if present
/// and non-empty.
pub fn parse_env_if_present<T: FromStr>(env_var: &str) -> Result<T, FromEnvErr<T::Err>> {
    let s = std::env::var(env_var).map_err(|e| FromEnvErr::env_err(env_var, e))?;

    if s.is_empty() {
        Err(FromEnvErr::empty(env_var))
    } else {
        s.parse().map_err(Into::into)
    }
}

/// Trait for loading structs from the environment.
///
/// Implementors read a fixed set of variables, known at compile time, and
/// list them in [`FromEnv::inventory`]. Unless the env is modified these are
/// essentially static runtime values, so load once at startup and pass the
/// result around.
pub trait FromEnv: core::fmt::Debug + Sized + 'static {
    /// Error type produced when loading from the environment.
    type Error: core::error::Error + Clone;

    /// Get the environment variables read by this type, including optional
    /// ones.
    fn inventory() -> Vec<&'static EnvItemInfo>;

    /// Check every variable in the inventory and return the non-optional
    /// ones that are missing.
    fn check_inventory() -> Result<(), Vec<&'static EnvItemInfo>> {
        let missing: Vec<_> = Self::inventory()
            .into_iter()
            .filter(|item| !item.optional && std::env::var(item.var).is_err())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Load from the environment.
    fn from_env() -> Result<Self, FromEnvErr<Self::Error>>;
}

/// Trait for loading primitives from a single environment variable. It has
/// been implemented for common integer types, [`String`], [`bool`],
/// [`url::Url`], [`tracing::Level`], and [`std::time::Duration`] (read as
/// milliseconds).
pub trait FromEnvVar: core::fmt::Debug + Sized + 'static {
    /// Error type produced when parsing the primitive.
    type Error: core::error::Error;

    /// Load the primitive from the environment at the given variable.
    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>>;

    /// Load the primitive, using `default` when the variable is absent or
    /// empty. A present but malformed value is still an error.
    fn from_env_var_or(env_var: &str, default: Self) -> Result<Self, FromEnvErr<Self::Error>> {
        match Self::from_env_var(env_var) {
            Err(err) if err.is_missing() => Ok(default),
            other => other,
        }
    }
}

impl<T> FromEnvVar for Option<T>
where
    T: FromEnvVar,
{
    type Error = T::Error;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        match std::env::var(env_var) {
            Ok(s) if s.is_empty() => Ok(None),
            Ok(_) => T::from_env_var(env_var).map(Some),
            Err(_) => Ok(None),
        }
    }
}

impl FromEnvVar for String {
    type Error = Infallible;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        match std::env::var(env_var) {
            Ok(s) if s.is_empty() => Err(FromEnvErr::empty(env_var)),
            Ok(s) => Ok(s),
            Err(e) => Err(FromEnvErr::env_err(env_var, e)),
        }
    }
}

impl FromEnvVar for std::time::Duration {
    type Error = ParseIntError;

    fn from_env_var(s: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        u64::from_env_var(s).map(Self::from_millis)
    }
}

macro_rules! impl_for_parseable {
    ($($t:ty),*) => {
        $(
            impl FromEnvVar for $t {
                type Error = <$t as FromStr>::Err;

                fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
                    parse_env_if_present(env_var)
                }
            }
        )*
    }
}

impl_for_parseable!(u16, u32, u64, i64, url::Url, tracing::Level);

impl FromEnvVar for bool {
    type Error = std::str::ParseBoolError;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        let s: String = std::env::var(env_var).map_err(|e| FromEnvErr::env_err(env_var, e))?;
        Ok(!s.is_empty())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn set<T>(env: &str, val: &T)
    where
        T: ToString,
    {
        std::env::set_var(env, val.to_string());
    }

    fn test<T>(env: &str, val: T)
    where
        T: ToString + FromEnvVar + PartialEq + std::fmt::Debug,
    {
        set(env, &val);

        let res = T::from_env_var(env).unwrap();
        assert_eq!(res, val);
    }

    #[test]
    fn test_primitives() {
        test("WEBAPP_TEST_U16", 3000u16);
        test("WEBAPP_TEST_U64", 42u64);
        test("WEBAPP_TEST_I64", -42i64);
        test("WEBAPP_TEST_STRING", "hello".to_string());
        test(
            "WEBAPP_TEST_URL",
            url::Url::parse("http://example.com").unwrap(),
        );
        test("WEBAPP_TEST_LEVEL", tracing::Level::INFO);
    }

    #[test]
    fn test_duration_is_millis() {
        set("WEBAPP_TEST_DURATION", &1500);
        let res = Duration::from_env_var("WEBAPP_TEST_DURATION").unwrap();
        assert_eq!(res, Duration::from_millis(1500));
    }

    #[test]
    fn test_a_few_errors() {
        set("WEBAPP_TEST_BAD_U16", &"70000");
        assert_eq!(
            u16::from_env_var("WEBAPP_TEST_BAD_U16").unwrap_err(),
            FromEnvErr::parse_error("70000".parse::<u16>().unwrap_err())
        );

        set("WEBAPP_TEST_EMPTY", &"");
        assert_eq!(
            u16::from_env_var("WEBAPP_TEST_EMPTY").unwrap_err(),
            FromEnvErr::empty("WEBAPP_TEST_EMPTY")
        );
        assert_eq!(
            String::from_env_var("WEBAPP_TEST_EMPTY").unwrap_err(),
            FromEnvErr::empty("WEBAPP_TEST_EMPTY")
        );
    }

    #[test]
    fn defaults_only_cover_missing_values() {
        std::env::remove_var("WEBAPP_TEST_ABSENT");
        assert_eq!(u64::from_env_var_or("WEBAPP_TEST_ABSENT", 7).unwrap(), 7);

        set("WEBAPP_TEST_GARBAGE", &"seven");
        assert!(u64::from_env_var_or("WEBAPP_TEST_GARBAGE", 7).is_err());

        assert_eq!(
            Option::<u64>::from_env_var("WEBAPP_TEST_ABSENT").unwrap(),
            None
        );
    }
}

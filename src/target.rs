use serde::Deserialize;
use std::{fmt, str::FromStr, time::Duration};
use url::{Host, Url};

use crate::error::Error;

/// Per-request timeout for every probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Period of the scheduled check loop.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

const WWW_PREFIX: &str = "www.";

/// Which probe sequence a check cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    /// HEAD first, with GET and alternate-host fallbacks.
    #[default]
    HeadWithFallback,
    /// A single GET on the primary URL.
    GetOnly,
}

impl FromStr for CheckMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "head-with-fallback" => Ok(CheckMode::HeadWithFallback),
            "get-only" => Ok(CheckMode::GetOnly),
            other => Err(Error::Config(format!(
                "unknown check mode `{other}`, expected `head-with-fallback` or `get-only`"
            ))),
        }
    }
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckMode::HeadWithFallback => "head-with-fallback",
            CheckMode::GetOnly => "get-only",
        })
    }
}

/// The site being monitored. Fixed for the lifetime of a [`Monitor`](crate::Monitor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    primary: Url,
    alternate: Option<Url>,
    user_agent: String,
    timeout: Duration,
    mode: CheckMode,
}

impl Target {
    #[must_use]
    pub fn new(primary: Url, product_name: &str, mode: CheckMode) -> Self {
        Self {
            alternate: alternate_url(&primary),
            primary,
            user_agent: format!("{product_name}/1.0 (+macOS)"),
            timeout: PROBE_TIMEOUT,
            mode,
        }
    }

    /// Parses `url` and builds a target for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UrlParse`] for malformed URLs and [`Error::Config`]
    /// for anything other than `http` or `https`.
    pub fn parse(url: &str, product_name: &str, mode: CheckMode) -> Result<Self, Error> {
        let primary = Url::parse(url)?;
        if !matches!(primary.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "unsupported URL scheme `{}` in {url}",
                primary.scheme()
            )));
        }
        Ok(Self::new(primary, product_name, mode))
    }

    #[must_use]
    pub fn primary(&self) -> &Url {
        &self.primary
    }

    #[must_use]
    pub fn alternate(&self) -> Option<&Url> {
        self.alternate.as_ref()
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn mode(&self) -> CheckMode {
        self.mode
    }

    /// Host name for display, without any `www.` prefix.
    #[must_use]
    pub fn site_name(&self) -> String {
        match self.primary.host_str() {
            Some(host) => host.strip_prefix(WWW_PREFIX).unwrap_or(host).to_string(),
            None => self.primary.to_string(),
        }
    }
}

/// The same URL with `www.` prepended to the host.
///
/// Only domain hosts that do not already start with `www.` have one.
#[must_use]
pub fn alternate_url(url: &Url) -> Option<Url> {
    let Some(Host::Domain(host)) = url.host() else {
        return None;
    };
    if host.starts_with(WWW_PREFIX) {
        return None;
    }

    let mut alternate = url.clone();
    alternate.set_host(Some(&format!("{WWW_PREFIX}{host}"))).ok()?;
    Some(alternate)
}

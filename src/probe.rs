use async_trait::async_trait;
use log::debug;
use reqwest::{Client, header::USER_AGENT};
use std::{error::Error as StdError, fmt, time::Duration};
use url::Url;

use crate::error::{CheckError, Error};

/// HTTP method used by a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Head,
    Get,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Head => reqwest::Method::HEAD,
            Method::Get => reqwest::Method::GET,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
        })
    }
}

/// Why a probe produced no HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    DnsResolution,
    Timeout,
    Connection,
    InvalidResponse,
    Other,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureReason::DnsResolution => "DNS resolution failure",
            FailureReason::Timeout => "timed out",
            FailureReason::Connection => "connection error",
            FailureReason::InvalidResponse => "invalid response",
            FailureReason::Other => "request failed",
        })
    }
}

/// Outcome of one HTTP request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Responded { status_code: u16 },
    Failed { reason: FailureReason },
}

impl ProbeOutcome {
    /// `Ok` with the status code when the site answered with 200-399.
    ///
    /// # Errors
    ///
    /// Returns the [`CheckError`] describing why this probe does not count
    /// as alive.
    pub fn liveness(&self) -> Result<u16, CheckError> {
        match *self {
            ProbeOutcome::Responded { status_code } if is_alive(status_code) => Ok(status_code),
            ProbeOutcome::Responded { status_code } => {
                Err(CheckError::NonSuccessStatus(status_code))
            }
            ProbeOutcome::Failed {
                reason: FailureReason::InvalidResponse,
            } => Err(CheckError::UnexpectedResponseShape),
            ProbeOutcome::Failed { reason } => Err(CheckError::Network(reason)),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness().is_ok()
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match *self {
            ProbeOutcome::Responded { status_code } => Some(status_code),
            ProbeOutcome::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn is_dns_failure(&self) -> bool {
        matches!(
            self,
            ProbeOutcome::Failed {
                reason: FailureReason::DnsResolution
            }
        )
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Responded { status_code } => write!(f, "status {status_code}"),
            ProbeOutcome::Failed { reason } => write!(f, "{reason}"),
        }
    }
}

/// Status codes 200 through 399 mean the site is up.
#[must_use]
pub fn is_alive(status_code: u16) -> bool {
    (200..=399).contains(&status_code)
}

/// Issues exactly one request and reports what happened. Never retries.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(
        &self,
        url: &Url,
        method: Method,
        timeout: Duration,
        user_agent: &str,
    ) -> ProbeOutcome;
}

/// [`Probe`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    /// Builds the underlying HTTP client.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(
        &self,
        url: &Url,
        method: Method,
        timeout: Duration,
        user_agent: &str,
    ) -> ProbeOutcome {
        let result = self
            .client
            .request(method.into(), url.clone())
            .timeout(timeout)
            .header(USER_AGENT, user_agent)
            .send()
            .await;

        match result {
            Ok(resp) => ProbeOutcome::Responded {
                status_code: resp.status().as_u16(),
            },
            Err(e) => {
                let reason = classify(&e);
                debug!("{method} {url} failed ({reason}): {e}");
                ProbeOutcome::Failed { reason }
            }
        }
    }
}

fn classify(err: &reqwest::Error) -> FailureReason {
    if err.is_timeout() {
        FailureReason::Timeout
    } else if is_dns_failure(err) {
        FailureReason::DnsResolution
    } else if is_parse_failure(err) {
        FailureReason::InvalidResponse
    } else if err.is_connect() {
        FailureReason::Connection
    } else {
        FailureReason::Other
    }
}

// reqwest has no dedicated DNS error kind; the resolver failure only shows up
// in the source chain of a connect error.
fn is_dns_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = cause.source();
    }
    false
}

// A peer that answers with something other than HTTP surfaces as a hyper parse
// error wrapped inside the request error.
fn is_parse_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause
            .downcast_ref::<hyper::Error>()
            .is_some_and(hyper::Error::is_parse)
        {
            return true;
        }
        source = cause.source();
    }
    false
}

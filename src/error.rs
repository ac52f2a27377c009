use thiserror::Error;

use crate::probe::FailureReason;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable fetching error: {0}")]
    EnvVar(#[from] dotenvy::Error),
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Why a single probe did not count as the site being alive.
///
/// These never leave the fallback strategy; they are reduced to
/// [`Status::Down`](crate::Status::Down) and only show up in logs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    #[error("network failure: {0}")]
    Network(FailureReason),
    #[error("response could not be interpreted as HTTP")]
    UnexpectedResponseShape,
    #[error("non-success status code {0}")]
    NonSuccessStatus(u16),
}

//! Website availability monitor.
//!
//! A [`Monitor`] periodically runs a [`FallbackStrategy`] against one
//! [`Target`] and publishes the resulting [`MonitorState`]: HEAD first, GET
//! when HEAD is rejected or fails, and the `www.` alternate host when the
//! primary host does not resolve.

pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod probe;
pub mod strategy;
pub mod target;

pub use config::Config;
pub use error::{CheckError, Error};
pub use models::{CheckResult, MonitorState, Status};
pub use monitor::{Clock, Monitor, RunState, SystemClock};
pub use probe::{FailureReason, HttpProbe, Method, Probe, ProbeOutcome};
pub use strategy::FallbackStrategy;
pub use target::{CHECK_INTERVAL, CheckMode, PROBE_TIMEOUT, Target};

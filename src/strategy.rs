//! Reduces a sequence of probes to a single [`Status`].
//!
//! The fallback tree is a fixed set of [`Step`]s. Each step names the request
//! it makes and, given that request's outcome, either resolves the check or
//! hands over to the next step. [`FallbackStrategy::resolve`] just walks the
//! steps until one resolves.

use log::{debug, info, warn};
use url::Url;

use crate::models::Status;
use crate::probe::{Method, Probe, ProbeOutcome};
use crate::target::{CheckMode, Target};

const METHOD_NOT_ALLOWED: u16 = 405;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    PrimaryHead,
    /// GET retry after the primary answered HEAD with 405.
    PrimaryGetAfterRejectedHead,
    AlternateHead,
    PrimaryGet,
    AlternateGet,
    /// The only step in [`CheckMode::GetOnly`].
    SingleGet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Resolved(Status),
    Continue(Step),
}

impl Step {
    fn first(mode: CheckMode) -> Self {
        match mode {
            CheckMode::HeadWithFallback => Step::PrimaryHead,
            CheckMode::GetOnly => Step::SingleGet,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Step::PrimaryHead => "primary HEAD",
            Step::PrimaryGetAfterRejectedHead => "GET after 405",
            Step::AlternateHead => "alternate HEAD",
            Step::PrimaryGet => "GET fallback",
            Step::AlternateGet => "alternate GET",
            Step::SingleGet => "GET",
        }
    }

    fn method(self) -> Method {
        match self {
            Step::PrimaryHead | Step::AlternateHead => Method::Head,
            Step::PrimaryGetAfterRejectedHead
            | Step::PrimaryGet
            | Step::AlternateGet
            | Step::SingleGet => Method::Get,
        }
    }

    fn url(self, target: &Target) -> Option<&Url> {
        match self {
            Step::AlternateHead | Step::AlternateGet => target.alternate(),
            _ => Some(target.primary()),
        }
    }

    /// Alternate steps are only entered after a DNS failure and only when the
    /// target has an alternate host.
    fn next(self, outcome: ProbeOutcome, has_alternate: bool) -> Next {
        if outcome.is_alive() {
            return Next::Resolved(Status::Up);
        }
        let try_alternate = has_alternate && outcome.is_dns_failure();

        match self {
            Step::PrimaryHead => match outcome.status_code() {
                Some(METHOD_NOT_ALLOWED) => Next::Continue(Step::PrimaryGetAfterRejectedHead),
                Some(_) => Next::Resolved(Status::Down),
                None if try_alternate => Next::Continue(Step::AlternateHead),
                None => Next::Continue(Step::PrimaryGet),
            },
            Step::AlternateHead => Next::Continue(Step::PrimaryGet),
            Step::PrimaryGet if try_alternate => Next::Continue(Step::AlternateGet),
            Step::PrimaryGet
            | Step::PrimaryGetAfterRejectedHead
            | Step::AlternateGet
            | Step::SingleGet => Next::Resolved(Status::Down),
        }
    }
}

/// Runs the probe sequence for a [`Target`].
#[derive(Debug)]
pub struct FallbackStrategy<P> {
    probe: P,
}

impl<P: Probe> FallbackStrategy<P> {
    #[must_use]
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    #[must_use]
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Probes `target` until the outcome is decided. Always returns
    /// [`Status::Up`] or [`Status::Down`], never [`Status::Unknown`].
    pub async fn resolve(&self, target: &Target) -> Status {
        let has_alternate = target.alternate().is_some();
        let mut step = Step::first(target.mode());
        let mut attempts = 0usize;

        loop {
            let method = step.method();
            let Some(url) = step.url(target) else {
                warn!("{}: no alternate host for {}", step.label(), target.primary());
                return Status::Down;
            };

            debug!("{}: {method} {url}", step.label());
            let outcome = self
                .probe
                .probe(url, method, target.timeout(), target.user_agent())
                .await;
            attempts += 1;

            match outcome.liveness() {
                Ok(code) => debug!("{}: {method} {url} answered {code}", step.label()),
                Err(e) => warn!("{}: {method} {url}: {e}", step.label()),
            }

            match step.next(outcome, has_alternate) {
                Next::Resolved(status) => {
                    info!("{}: {status} after {attempts} probe(s)", target.primary());
                    return status;
                }
                Next::Continue(next) => step = next,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FailureReason;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed list of outcomes and records every request.
    struct ScriptedProbe {
        outcomes: Mutex<VecDeque<ProbeOutcome>>,
        calls: Mutex<Vec<(Method, String)>>,
    }

    impl ScriptedProbe {
        fn new(outcomes: impl IntoIterator<Item = ProbeOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(Method, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(
            &self,
            url: &Url,
            method: Method,
            _timeout: Duration,
            _user_agent: &str,
        ) -> ProbeOutcome {
            self.calls.lock().unwrap().push((method, url.to_string()));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("probe called more often than scripted")
        }
    }

    fn code(status_code: u16) -> ProbeOutcome {
        ProbeOutcome::Responded { status_code }
    }

    fn failed(reason: FailureReason) -> ProbeOutcome {
        ProbeOutcome::Failed { reason }
    }

    const DNS: ProbeOutcome = ProbeOutcome::Failed {
        reason: FailureReason::DnsResolution,
    };

    const BARE: &str = "https://example.com/";
    const WWW: &str = "https://www.example.com/";

    fn target(url: &str) -> Target {
        Target::parse(url, "UpDot", CheckMode::HeadWithFallback).unwrap()
    }

    async fn run(url: &str, outcomes: Vec<ProbeOutcome>) -> (Status, Vec<(Method, String)>) {
        let strategy = FallbackStrategy::new(ScriptedProbe::new(outcomes));
        let status = strategy.resolve(&target(url)).await;
        (status, strategy.probe().calls())
    }

    #[tokio::test]
    async fn test_head_success_needs_one_probe() {
        let (status, calls) = run(BARE, vec![code(200)]).await;
        assert_eq!(status, Status::Up);
        assert_eq!(calls, vec![(Method::Head, BARE.to_string())]);
    }

    #[tokio::test]
    async fn test_redirect_counts_as_up() {
        let (status, calls) = run(BARE, vec![code(301)]).await;
        assert_eq!(status, Status::Up);
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn test_head_405_then_get_ok_is_up() {
        let (status, calls) = run(BARE, vec![code(405), code(200)]).await;
        assert_eq!(status, Status::Up);
        assert_eq!(
            calls,
            vec![
                (Method::Head, BARE.to_string()),
                (Method::Get, BARE.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_head_405_then_get_500_is_down() {
        let (status, calls) = run(BARE, vec![code(405), code(500)]).await;
        assert_eq!(status, Status::Down);
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_head_405_then_get_failure_is_down_without_alternate() {
        let (status, calls) = run(BARE, vec![code(405), DNS]).await;
        assert_eq!(status, Status::Down);
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_head_other_code_is_down_without_fallback() {
        let (status, calls) = run(BARE, vec![code(503)]).await;
        assert_eq!(status, Status::Down);
        assert_eq!(calls.len(), 1);
    }

    #[tokio::test]
    async fn test_dns_failure_alternate_head_short_circuits() {
        let (status, calls) = run(BARE, vec![DNS, code(200)]).await;
        assert_eq!(status, Status::Up);
        assert_eq!(
            calls,
            vec![
                (Method::Head, BARE.to_string()),
                (Method::Head, WWW.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_alternate_head_timeout_falls_through_to_primary_get() {
        let (status, calls) = run(
            BARE,
            vec![DNS, failed(FailureReason::Timeout), code(204)],
        )
        .await;
        assert_eq!(status, Status::Up);
        assert_eq!(
            calls,
            vec![
                (Method::Head, BARE.to_string()),
                (Method::Head, WWW.to_string()),
                (Method::Get, BARE.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_alternate_head_error_code_falls_through_to_primary_get() {
        let (status, calls) = run(BARE, vec![DNS, code(404), code(500)]).await;
        assert_eq!(status, Status::Down);
        assert_eq!(calls.len(), 3);
    }

    #[tokio::test]
    async fn test_dns_failure_without_alternate_goes_to_primary_get() {
        let (status, calls) = run(WWW, vec![DNS, code(200)]).await;
        assert_eq!(status, Status::Up);
        assert_eq!(
            calls,
            vec![
                (Method::Head, WWW.to_string()),
                (Method::Get, WWW.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_fully_degraded_check_uses_four_probes() {
        let (status, calls) = run(BARE, vec![DNS, DNS, DNS, DNS]).await;
        assert_eq!(status, Status::Down);
        assert_eq!(
            calls,
            vec![
                (Method::Head, BARE.to_string()),
                (Method::Head, WWW.to_string()),
                (Method::Get, BARE.to_string()),
                (Method::Get, WWW.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_alternate_get_recovers() {
        let (status, calls) = run(BARE, vec![DNS, DNS, DNS, code(200)]).await;
        assert_eq!(status, Status::Up);
        assert_eq!(calls.len(), 4);
    }

    #[tokio::test]
    async fn test_timeout_does_not_try_alternate() {
        let (status, calls) = run(
            BARE,
            vec![
                failed(FailureReason::Timeout),
                failed(FailureReason::Connection),
            ],
        )
        .await;
        assert_eq!(status, Status::Down);
        assert_eq!(
            calls,
            vec![
                (Method::Head, BARE.to_string()),
                (Method::Get, BARE.to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_get_only_mode_ignores_fallbacks() {
        let strategy = FallbackStrategy::new(ScriptedProbe::new([DNS]));
        let target = Target::parse(BARE, "UpDot", CheckMode::GetOnly).unwrap();
        assert_eq!(strategy.resolve(&target).await, Status::Down);
        assert_eq!(
            strategy.probe().calls(),
            vec![(Method::Get, BARE.to_string())]
        );

        let strategy = FallbackStrategy::new(ScriptedProbe::new([code(302)]));
        assert_eq!(strategy.resolve(&target).await, Status::Up);
    }

    #[tokio::test]
    async fn test_every_outcome_sequence_resolves_to_up_or_down() {
        let alphabet = [
            code(200),
            code(399),
            code(405),
            code(500),
            DNS,
            failed(FailureReason::Timeout),
            failed(FailureReason::Connection),
            failed(FailureReason::InvalidResponse),
        ];
        let n = alphabet.len();

        for url in [BARE, WWW] {
            for index in 0..n.pow(4) {
                let sequence: Vec<ProbeOutcome> = (0..4)
                    .map(|position| alphabet[(index / n.pow(position)) % n])
                    .collect();
                let probe = ScriptedProbe::new(sequence.clone());
                let strategy = FallbackStrategy::new(probe);

                let status = strategy.resolve(&target(url)).await;
                let used = strategy.probe().calls().len();

                assert_ne!(status, Status::Unknown, "{sequence:?}");
                assert!((1..=4).contains(&used), "{sequence:?}");
                assert_eq!(
                    status == Status::Up,
                    sequence[used - 1].is_alive(),
                    "{url} {sequence:?}"
                );
            }
        }
    }
}

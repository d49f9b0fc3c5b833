//! Diagnostic reports and the bounded DOM probe runner.
//!
//! A diagnostic run evaluates every condition the render decision would,
//! without short-circuiting, and keeps the tri-state outcome of each. DOM
//! probes run on a helper thread; the reporter waits on a crossbeam channel
//! with a deadline and abandons the probe on timeout or cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::config::DomQueryPolicy;
use crate::context::{DomObservation, DomProbe, DomQuery};
use crate::error::ExecutionError;
use crate::evaluate::{dom, EvaluationResult, TriState};
use crate::survey::SurveyId;
use crate::trigger::TriggerKind;

/// Longest uninterrupted wait before re-checking for cancellation.
const POLL_SLICE: Duration = Duration::from_millis(25);

/// How a condition participates in the eligibility fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionRole {
    /// Passes only when `True`.
    Required,
    /// Passes unless `False`. Used for suppressers and device-dependent
    /// checks that could not be resolved.
    FailOpen,
    /// Reported for troubleshooting; never affects eligibility.
    Informational,
}

/// One line of a diagnostic report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionReport {
    pub label: String,
    pub satisfied: TriState,
    pub message: String,
    pub role: ConditionRole,
}

impl ConditionReport {
    #[must_use]
    pub fn new(label: impl Into<String>, result: EvaluationResult, role: ConditionRole) -> Self {
        Self {
            label: label.into(),
            satisfied: result.satisfied,
            message: result.message,
            role,
        }
    }

    pub(crate) fn required(label: impl Into<String>, result: EvaluationResult) -> Self {
        Self::new(label, result, ConditionRole::Required)
    }

    /// Whether this condition lets the survey render.
    #[must_use]
    pub const fn passes(&self) -> bool {
        match self.role {
            ConditionRole::Required => self.satisfied.is_true(),
            ConditionRole::FailOpen => !self.satisfied.is_false(),
            ConditionRole::Informational => true,
        }
    }
}

/// Full troubleshooting output for one survey and one visitor context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticReport {
    pub report_id: Uuid,
    pub survey_id: SurveyId,
    pub generated_at: DateTime<Utc>,
    pub conditions: Vec<ConditionReport>,
}

impl DiagnosticReport {
    pub(crate) fn new(survey_id: SurveyId, conditions: Vec<ConditionReport>) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            survey_id,
            generated_at: Utc::now(),
            conditions,
        }
    }

    /// Folds the conditions the same way the render decision does.
    #[must_use]
    pub fn eligible(&self) -> bool {
        self.conditions.iter().all(ConditionReport::passes)
    }

    /// Counts of `(true, false, indeterminate)` entries.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        self.conditions
            .iter()
            .fold((0, 0, 0), |(t, f, i), c| match c.satisfied {
                TriState::True => (t + 1, f, i),
                TriState::False => (t, f + 1, i),
                TriState::Indeterminate => (t, f, i + 1),
            })
    }

    /// Entries whose outcome could not be decided.
    pub fn indeterminate(&self) -> impl Iterator<Item = &ConditionReport> {
        self.conditions.iter().filter(|c| c.satisfied.is_indeterminate())
    }

    /// First entry with the given label.
    #[must_use]
    pub fn condition(&self, label: &str) -> Option<&ConditionReport> {
        self.conditions.iter().find(|c| c.label == label)
    }
}

/// Caller-owned cancellation flag for a diagnostic run.
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Issues DOM probes for one diagnostic run under a shared deadline.
pub(crate) struct DomProbeRunner<'a> {
    query: Arc<dyn DomQuery>,
    url: String,
    policy: DomQueryPolicy,
    deadline: Instant,
    cancel: &'a CancellationToken,
}

impl<'a> DomProbeRunner<'a> {
    pub(crate) fn new(
        query: Arc<dyn DomQuery>,
        url: impl Into<String>,
        policy: DomQueryPolicy,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            query,
            url: url.into(),
            policy,
            deadline: Instant::now() + policy.overall_timeout(),
            cancel,
        }
    }

    fn timeout_error(&self) -> ExecutionError {
        ExecutionError::Timeout {
            duration_ms: self.policy.overall_timeout_ms,
        }
    }

    fn remaining(&self) -> Result<Duration, ExecutionError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.timeout_error());
        }
        Ok(remaining)
    }

    /// Sleeps up to `pause`, waking early on cancellation or deadline.
    fn pause(&self, pause: Duration) -> Result<(), ExecutionError> {
        let until = Instant::now() + pause;
        loop {
            let remaining = self.remaining()?;
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            thread::sleep(left.min(remaining).min(POLL_SLICE));
        }
    }

    /// One collaborator call on a helper thread, bounded by the deadline.
    fn attempt(&self, probe: &DomProbe) -> Result<DomObservation, ExecutionError> {
        self.remaining()?;
        let (tx, rx) = bounded(1);
        let query = Arc::clone(&self.query);
        let url = self.url.clone();
        let job = probe.clone();
        thread::Builder::new()
            .name("survey-dom-probe".to_string())
            .spawn(move || {
                let _ = tx.send(query.query(&url, &job));
            })
            .map_err(|e| ExecutionError::DomQuery {
                message: format!("failed to spawn probe thread: {e}"),
            })?;

        loop {
            let remaining = self.remaining()?;
            match rx.recv_timeout(remaining.min(POLL_SLICE)) {
                Ok(result) => return result,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ExecutionError::DomQuery {
                        message: "probe thread exited without an answer".to_string(),
                    })
                }
            }
        }
    }

    /// Runs `probe` until it is decided, retrying visibility probes while
    /// the page is pending or erroring.
    pub(crate) fn run(&self, probe: &DomProbe) -> Result<bool, ExecutionError> {
        let attempts = if dom::retries_pending(probe) {
            self.policy.max_attempts.max(1)
        } else {
            1
        };
        let mut last = ExecutionError::DomQuery {
            message: format!("{probe} did not settle"),
        };
        for attempt in 1..=attempts {
            match self.attempt(probe) {
                Ok(DomObservation::Found(found)) => return Ok(found),
                Ok(DomObservation::Pending) => {
                    last = ExecutionError::DomQuery {
                        message: format!("{probe} did not settle after {attempt} attempt(s)"),
                    };
                }
                Err(err @ (ExecutionError::Cancelled | ExecutionError::Timeout { .. })) => {
                    warn!(probe = %probe, error = %err, "DOM probe abandoned");
                    return Err(err);
                }
                Err(err) => {
                    warn!(probe = %probe, attempt, error = %err, "DOM probe failed");
                    last = err;
                }
            }
            if attempt < attempts {
                self.pause(self.policy.retry_interval())?;
            }
        }
        Err(last)
    }

    /// Evaluates a DOM-dependent trigger kind; failures become `Indeterminate`.
    pub(crate) fn evaluate(&self, kind: &TriggerKind) -> Option<EvaluationResult> {
        let probe = dom::probe_for(kind)?;
        Some(match self.run(&probe) {
            Ok(found) => dom::interpret(kind, found),
            Err(err) => EvaluationResult::indeterminate(format!("{}: {err}", dom::label(kind))),
        })
    }

    /// Runs a diagnostic-only probe and reports it under `label`.
    pub(crate) fn informational(&self, label: &str, probe: &DomProbe) -> ConditionReport {
        let result = match self.run(probe) {
            Ok(found) => EvaluationResult::from_bool(found, format!("{probe}: {found}")),
            Err(err) => EvaluationResult::indeterminate(format!("{probe}: {err}")),
        };
        ConditionReport::new(label, result, ConditionRole::Informational)
    }
}

//! DOM-dependent triggers.
//!
//! These kinds ask the injected `DomQuery` about a live page. The pure
//! evaluator makes a single call; the diagnostic reporter drives the same
//! probes with retries and a deadline.

use super::EvaluationResult;
use crate::context::{DomObservation, DomProbe, VisitorContext};
use crate::trigger::TriggerKind;

/// Message used when no browser-backed collaborator was supplied.
pub const LIVE_PAGE_REQUIRED: &str = "requires a live page fetch; no DOM query available";

/// Diagnostic label of a DOM-dependent kind.
pub(crate) fn label(kind: &TriggerKind) -> String {
    match kind {
        TriggerKind::PageElementVisible { .. } => "Is the page element visible".to_string(),
        TriggerKind::PageElementClicked { .. } => "Can the page element be clicked".to_string(),
        TriggerKind::TextOnPage { .. } => "Is the text on page trigger satisfied".to_string(),
        other => other.to_string(),
    }
}

/// The probe a DOM-dependent kind issues, or None for context-only kinds.
pub(crate) fn probe_for(kind: &TriggerKind) -> Option<DomProbe> {
    match kind {
        TriggerKind::PageElementVisible { selector } => Some(DomProbe::ElementVisible {
            selector: selector.clone(),
        }),
        TriggerKind::PageElementClicked { selector } => Some(DomProbe::ElementClicked {
            selector: selector.clone(),
        }),
        TriggerKind::TextOnPage { selector, text, .. } => Some(DomProbe::TextOnPage {
            selector: selector.clone(),
            text: text.clone(),
        }),
        _ => None,
    }
}

/// Whether a probe should be asked again when the page has not settled.
pub(crate) const fn retries_pending(probe: &DomProbe) -> bool {
    matches!(probe, DomProbe::ElementVisible { .. })
}

/// Interprets a decided probe for `kind`; `TextOnPage` honors `presence`.
pub(crate) fn interpret(kind: &TriggerKind, found: bool) -> EvaluationResult {
    match kind {
        TriggerKind::TextOnPage {
            selector,
            text,
            presence,
        } => {
            let state = if found { "found" } else { "not found" };
            EvaluationResult::from_bool(found == *presence, format!("text '{text}' {state} in {selector}"))
        }
        TriggerKind::PageElementVisible { selector } => {
            let state = if found { "visible" } else { "not visible" };
            EvaluationResult::from_bool(found, format!("element {selector} {state}"))
        }
        TriggerKind::PageElementClicked { selector } => {
            let state = if found { "clickable" } else { "not clickable" };
            EvaluationResult::from_bool(found, format!("element {selector} {state}"))
        }
        other => EvaluationResult::from_bool(found, other.to_string()),
    }
}

pub(super) fn evaluate_once(kind: &TriggerKind, ctx: &VisitorContext) -> EvaluationResult {
    let Some(probe) = probe_for(kind) else {
        return EvaluationResult::indeterminate(format!("{kind} is not a DOM trigger"));
    };
    let Some(url) = ctx.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return EvaluationResult::missing_url(&label(kind));
    };
    let Some(query) = ctx.dom_query.as_ref() else {
        return EvaluationResult::indeterminate(format!("{}: {LIVE_PAGE_REQUIRED}", label(kind)));
    };
    match query.query(url, &probe) {
        Ok(DomObservation::Found(found)) => interpret(kind, found),
        Ok(DomObservation::Pending) => {
            EvaluationResult::indeterminate(format!("{}: page has not settled", label(kind)))
        }
        Err(err) => EvaluationResult::indeterminate(format!("{}: {err}", label(kind))),
    }
}

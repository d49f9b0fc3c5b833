//! Context-only predicates.

use super::EvaluationResult;
use crate::context::VisitorContext;
use crate::survey::{PossibleAnswerId, SurveyId};
use crate::trigger::url::normalize_exact;
use crate::trigger::{TriggerKind, TriggerPattern, VisitorType};

fn url_label(kind: &TriggerKind) -> &'static str {
    match kind {
        TriggerKind::UrlEquals { .. } => "URL same as target",
        TriggerKind::RegexMatches { .. } => "URL matches regular expression",
        _ => "URL contains target",
    }
}

pub(super) fn url_contains(kind: &TriggerKind, target: &str, ctx: &VisitorContext) -> EvaluationResult {
    let Some(visitor) = ctx.stripped_url() else {
        return EvaluationResult::missing_url(url_label(kind));
    };
    let passes = visitor.contains(target);
    let verb = if passes { "contains" } else { "does not contain" };
    EvaluationResult::from_bool(passes, format!("'{visitor}' {verb} '{target}'"))
}

pub(super) fn url_equals(kind: &TriggerKind, target: &str, ctx: &VisitorContext) -> EvaluationResult {
    let Some(url) = ctx.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return EvaluationResult::missing_url(url_label(kind));
    };
    let visitor = normalize_exact(url);
    let passes = visitor == target;
    let verb = if passes { "equals" } else { "differs from" };
    EvaluationResult::from_bool(passes, format!("'{visitor}' {verb} '{target}'"))
}

pub(super) fn regex_matches(
    kind: &TriggerKind,
    pattern: &TriggerPattern,
    ctx: &VisitorContext,
) -> EvaluationResult {
    let Some(visitor) = ctx.stripped_url() else {
        return EvaluationResult::missing_url(url_label(kind));
    };
    let passes = pattern.is_match(visitor);
    let verb = if passes { "matches" } else { "does not match" };
    EvaluationResult::from_bool(passes, format!("'{visitor}' {verb} /{pattern}/"))
}

/// Country must match; a region, when configured, must match the state or DMA code.
pub(super) fn geo(country: &str, region: Option<&str>, ctx: &VisitorContext) -> EvaluationResult {
    let Some(location) = ctx.geo.as_ref().filter(|g| !g.country.trim().is_empty()) else {
        return EvaluationResult::indeterminate("visitor location unknown");
    };
    if !location.country.trim().eq_ignore_ascii_case(country) {
        return EvaluationResult::from_bool(
            false,
            format!("visitor country {} is not {country}", location.country),
        );
    }
    let Some(region) = region else {
        return EvaluationResult::from_bool(true, format!("visitor located in {country}"));
    };
    let matches_region = |value: Option<&String>| value.is_some_and(|v| v.trim().eq_ignore_ascii_case(region));
    if matches_region(location.state.as_ref()) || matches_region(location.metro_code.as_ref()) {
        EvaluationResult::from_bool(true, format!("visitor located in {country} {region}"))
    } else if location.state.is_none() && location.metro_code.is_none() {
        EvaluationResult::indeterminate(format!("visitor region unknown, expected {region}"))
    } else {
        EvaluationResult::from_bool(false, format!("visitor not located in {country} {region}"))
    }
}

pub(super) fn pseudo_event(event: &str, ctx: &VisitorContext) -> EvaluationResult {
    match ctx.fired_pseudo_event.as_deref() {
        None => EvaluationResult::indeterminate("no pseudo event fired"),
        Some(fired) if fired == event => EvaluationResult::from_bool(true, format!("pseudo event {event} fired")),
        Some(fired) => EvaluationResult::from_bool(false, format!("fired pseudo event {fired}, expected {event}")),
    }
}

pub(super) fn previous_answer(
    survey_id: SurveyId,
    answer: PossibleAnswerId,
    ctx: &VisitorContext,
) -> EvaluationResult {
    let Some(answers) = ctx.previous_answers.as_ref() else {
        return EvaluationResult::indeterminate("previous answers not supplied");
    };
    match answers.get(&survey_id) {
        Some(chosen) if *chosen == answer => EvaluationResult::from_bool(
            true,
            format!("answered possible answer {answer} on survey {survey_id}"),
        ),
        Some(chosen) => EvaluationResult::from_bool(
            false,
            format!("answered possible answer {chosen} on survey {survey_id}, expected {answer}"),
        ),
        None => EvaluationResult::from_bool(false, format!("no answer recorded for survey {survey_id}")),
    }
}

pub(super) fn mobile_pageview(view_name: &str, ctx: &VisitorContext) -> EvaluationResult {
    let Some(current) = ctx.mobile_view_name.as_deref() else {
        return EvaluationResult::indeterminate("mobile view name not supplied");
    };
    let passes = current.contains(view_name);
    let verb = if passes { "contains" } else { "does not contain" };
    EvaluationResult::from_bool(passes, format!("view '{current}' {verb} '{view_name}'"))
}

pub(super) fn mobile_regexp(pattern: &TriggerPattern, ctx: &VisitorContext) -> EvaluationResult {
    let Some(current) = ctx.mobile_view_name.as_deref() else {
        return EvaluationResult::indeterminate("mobile view name not supplied");
    };
    let passes = pattern.is_match(current);
    let verb = if passes { "matches" } else { "does not match" };
    EvaluationResult::from_bool(passes, format!("view '{current}' {verb} /{pattern}/"))
}

/// Threshold check shared by every counter-style trigger.
pub(super) fn at_least(signal: &str, observed: Option<u32>, threshold: u32) -> EvaluationResult {
    match observed {
        None => EvaluationResult::indeterminate(format!("{signal} not supplied")),
        Some(value) => EvaluationResult::from_bool(
            value >= threshold,
            format!("{signal} {value}, threshold {threshold}"),
        ),
    }
}

pub(super) fn intent_exit(ctx: &VisitorContext) -> EvaluationResult {
    match ctx.exit_intent {
        None => EvaluationResult::indeterminate("exit intent not observed"),
        Some(true) => EvaluationResult::from_bool(true, "exit intent detected"),
        Some(false) => EvaluationResult::from_bool(false, "no exit intent"),
    }
}

pub(super) fn client_key(expected: bool, ctx: &VisitorContext) -> EvaluationResult {
    let Some(present) = ctx.client_key_present else {
        return EvaluationResult::indeterminate("client key presence not supplied");
    };
    let state = if present { "present" } else { "absent" };
    EvaluationResult::from_bool(present == expected, format!("client key {state}"))
}

pub(super) fn visit(visitor_type: VisitorType, visits_count: u32, ctx: &VisitorContext) -> EvaluationResult {
    if visitor_type == VisitorType::All {
        return EvaluationResult::from_bool(true, "all visitors admitted");
    }
    let Some(visits) = ctx.visit_count else {
        return EvaluationResult::indeterminate("visit count not supplied");
    };
    match visitor_type {
        VisitorType::New => EvaluationResult::from_bool(visits <= 1, format!("visit count {visits}, new visitors only")),
        _ => EvaluationResult::from_bool(
            visits >= visits_count,
            format!("visit count {visits}, returning after {visits_count}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GeoLocation;
    use crate::evaluate::{evaluate, TriState};
    use crate::trigger::Trigger;

    fn outcome(trigger: &Trigger, ctx: &VisitorContext) -> TriState {
        evaluate(trigger, ctx).satisfied
    }

    #[test]
    fn test_url_contains() {
        let trigger = Trigger::url_contains("foo.com/bar").unwrap();
        let ctx = VisitorContext::new().with_url("https://foo.com/bar/baz");
        assert_eq!(outcome(&trigger, &ctx), TriState::True);
        let ctx = VisitorContext::new().with_url("https://other.com");
        assert_eq!(outcome(&trigger, &ctx), TriState::False);
    }

    #[test]
    fn test_url_equals() {
        let trigger = Trigger::url_equals("foo.com/bar").unwrap();
        let ctx = VisitorContext::new().with_url("http://foo.com/bar/");
        assert_eq!(outcome(&trigger, &ctx), TriState::True);
        let ctx = VisitorContext::new().with_url("http://foo.com/bar/baz");
        assert_eq!(outcome(&trigger, &ctx), TriState::False);
        let ctx = VisitorContext::new().with_url("http://foo.com/bar?x=1");
        assert_eq!(outcome(&trigger, &ctx), TriState::False);
    }

    #[test]
    fn test_url_missing_is_indeterminate() {
        let trigger = Trigger::url_equals("foo.com").unwrap();
        let result = evaluate(&trigger, &VisitorContext::new());
        assert_eq!(result.satisfied, TriState::Indeterminate);
        assert_eq!(result.message, "PROVIDE URL TO CHECK -- URL same as target?");
    }

    #[test]
    fn test_regex_matches_case_insensitive() {
        let trigger = Trigger::regex_matches(r"^site\.com/blog/\d+$").unwrap();
        let ctx = VisitorContext::new().with_url("https://SITE.com/blog/42");
        assert_eq!(outcome(&trigger, &ctx), TriState::True);
        let ctx = VisitorContext::new().with_url("https://site.com/blog/new");
        assert_eq!(outcome(&trigger, &ctx), TriState::False);
    }

    #[test]
    fn test_geo() {
        let trigger = Trigger::geo("US", Some("CA")).unwrap();
        let ca = VisitorContext::new().with_geo(GeoLocation::new("US").with_state("CA"));
        assert_eq!(outcome(&trigger, &ca), TriState::True);

        let dma = VisitorContext::new().with_geo(GeoLocation::new("US").with_state("NV").with_metro_code("CA"));
        assert_eq!(outcome(&trigger, &dma), TriState::True);

        let ny = VisitorContext::new().with_geo(GeoLocation::new("US").with_state("NY"));
        assert_eq!(outcome(&trigger, &ny), TriState::False);

        let fr = VisitorContext::new().with_geo(GeoLocation::new("FR"));
        assert_eq!(outcome(&trigger, &fr), TriState::False);

        let no_region = VisitorContext::new().with_geo(GeoLocation::new("US"));
        assert_eq!(outcome(&trigger, &no_region), TriState::Indeterminate);
        assert_eq!(outcome(&trigger, &VisitorContext::new()), TriState::Indeterminate);

        let country_only = Trigger::geo("us", None).unwrap();
        assert_eq!(outcome(&country_only, &no_region), TriState::True);
    }

    #[test]
    fn test_pseudo_event() {
        let trigger = Trigger::pseudo_event("checkout").unwrap();
        assert_eq!(
            outcome(&trigger, &VisitorContext::new().with_pseudo_event("checkout")),
            TriState::True
        );
        assert_eq!(
            outcome(&trigger, &VisitorContext::new().with_pseudo_event("signup")),
            TriState::False
        );
        assert_eq!(outcome(&trigger, &VisitorContext::new()), TriState::Indeterminate);
    }

    #[test]
    fn test_previous_answer() {
        let trigger = Trigger::previous_answer(SurveyId::new(1), PossibleAnswerId::new(10));
        let hit = VisitorContext::new().with_previous_answer(SurveyId::new(1), PossibleAnswerId::new(10));
        assert_eq!(outcome(&trigger, &hit), TriState::True);
        let other = VisitorContext::new().with_previous_answer(SurveyId::new(1), PossibleAnswerId::new(11));
        assert_eq!(outcome(&trigger, &other), TriState::False);
        let unrelated = VisitorContext::new().with_previous_answer(SurveyId::new(2), PossibleAnswerId::new(10));
        assert_eq!(outcome(&trigger, &unrelated), TriState::False);
        assert_eq!(outcome(&trigger, &VisitorContext::new()), TriState::Indeterminate);
    }

    #[test]
    fn test_counters() {
        let scroll = Trigger::page_scroll(50).unwrap();
        assert_eq!(
            outcome(&scroll, &VisitorContext::new().with_scroll_percentage(50)),
            TriState::True
        );
        assert_eq!(
            outcome(&scroll, &VisitorContext::new().with_scroll_percentage(49)),
            TriState::False
        );
        assert_eq!(outcome(&scroll, &VisitorContext::new()), TriState::Indeterminate);

        let seconds = Trigger::page_after_seconds(10);
        assert_eq!(
            outcome(&seconds, &VisitorContext::new().with_elapsed_seconds(12)),
            TriState::True
        );

        let pageview = Trigger::pageview(3);
        assert_eq!(
            outcome(&pageview, &VisitorContext::new().with_pageview_count(2)),
            TriState::False
        );

        let install = Trigger::mobile_install(7);
        assert_eq!(
            outcome(&install, &VisitorContext::new().with_days_installed(7)),
            TriState::True
        );

        let launch = Trigger::mobile_launch(5);
        assert_eq!(
            outcome(&launch, &VisitorContext::new().with_launch_times(4)),
            TriState::False
        );
    }

    #[test]
    fn test_mobile_view() {
        let pageview = Trigger::mobile_pageview("Checkout").unwrap();
        let ctx = VisitorContext::new().with_mobile_view_name("CheckoutViewController");
        assert_eq!(outcome(&pageview, &ctx), TriState::True);

        let regexp = Trigger::mobile_regexp("^checkout").unwrap();
        assert_eq!(outcome(&regexp, &ctx), TriState::True);
        assert_eq!(outcome(&regexp, &VisitorContext::new()), TriState::Indeterminate);
    }

    #[test]
    fn test_client_key_and_exit_intent() {
        let required = Trigger::client_key_presence(true);
        assert_eq!(
            outcome(&required, &VisitorContext::new().with_client_key_present(true)),
            TriState::True
        );
        let absent = Trigger::client_key_presence(false);
        assert_eq!(
            outcome(&absent, &VisitorContext::new().with_client_key_present(true)),
            TriState::False
        );

        let exit = Trigger::page_intent_exit();
        assert_eq!(outcome(&exit, &VisitorContext::new().with_exit_intent(true)), TriState::True);
        assert_eq!(outcome(&exit, &VisitorContext::new()), TriState::Indeterminate);
    }

    #[test]
    fn test_visit() {
        let all = Trigger::visit(VisitorType::All, 0);
        assert_eq!(outcome(&all, &VisitorContext::new()), TriState::True);

        let new = Trigger::visit(VisitorType::New, 0);
        assert_eq!(outcome(&new, &VisitorContext::new().with_visit_count(1)), TriState::True);
        assert_eq!(outcome(&new, &VisitorContext::new().with_visit_count(2)), TriState::False);

        let returning = Trigger::visit(VisitorType::Returning, 3);
        assert_eq!(
            outcome(&returning, &VisitorContext::new().with_visit_count(3)),
            TriState::True
        );
        assert_eq!(
            outcome(&returning, &VisitorContext::new().with_visit_count(2)),
            TriState::False
        );
        assert_eq!(outcome(&returning, &VisitorContext::new()), TriState::Indeterminate);
    }
}

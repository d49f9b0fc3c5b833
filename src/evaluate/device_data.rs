//! Device-data matchers.
//!
//! A missing key is an ordinary failure (or a pass for the negative
//! matchers). Only a device-data map that was never supplied is
//! indeterminate.

use super::EvaluationResult;
use crate::context::VisitorContext;
use crate::trigger::DeviceDataMatcher;
use crate::value::DeviceValue;

pub(super) fn evaluate(
    key: &str,
    matcher: DeviceDataMatcher,
    expected: Option<&str>,
    ctx: &VisitorContext,
) -> EvaluationResult {
    let Some(data) = ctx.device_data.as_ref() else {
        return EvaluationResult::indeterminate("device data not supplied");
    };
    let Some(actual) = data.get(key) else {
        let passes = matches!(
            matcher,
            DeviceDataMatcher::IsNot | DeviceDataMatcher::DoesNotContain | DeviceDataMatcher::IsNotTrue
        );
        return EvaluationResult::from_bool(passes, format!("device data key '{key}' not present"));
    };

    let expected = expected.unwrap_or_default();
    let passes = match matcher {
        DeviceDataMatcher::IsTrue => actual.is_truthy(),
        DeviceDataMatcher::IsNotTrue => !actual.is_truthy(),
        DeviceDataMatcher::Is => text_equals(actual, expected),
        DeviceDataMatcher::IsNot => !text_equals(actual, expected),
        DeviceDataMatcher::Contains => actual.as_text().contains(expected),
        DeviceDataMatcher::DoesNotContain => !actual.as_text().contains(expected),
        DeviceDataMatcher::IsMoreThan
        | DeviceDataMatcher::IsEqualOrMoreThan
        | DeviceDataMatcher::IsEqualOrLessThan
        | DeviceDataMatcher::IsLessThan => {
            let Some(threshold) = expected.trim().parse::<f64>().ok() else {
                return EvaluationResult::from_bool(false, format!("'{expected}' is not numeric"));
            };
            let Some(observed) = actual.as_number() else {
                return EvaluationResult::from_bool(
                    false,
                    format!("device data key '{key}' holds non-numeric {actual}"),
                );
            };
            compare(matcher, observed, threshold)
        }
    };

    let message = if matcher.takes_value() {
        format!("device data '{key}' = {actual}, {matcher} '{expected}'")
    } else {
        format!("device data '{key}' = {actual}, {matcher}")
    };
    EvaluationResult::from_bool(passes, message)
}

fn text_equals(actual: &DeviceValue, expected: &str) -> bool {
    match actual {
        DeviceValue::Number(n) => expected.trim().parse::<f64>().is_ok_and(|e| e == *n),
        other => other.as_text() == expected,
    }
}

fn compare(matcher: DeviceDataMatcher, observed: f64, threshold: f64) -> bool {
    match matcher {
        DeviceDataMatcher::IsMoreThan => observed > threshold,
        DeviceDataMatcher::IsEqualOrMoreThan => observed >= threshold,
        DeviceDataMatcher::IsEqualOrLessThan => observed <= threshold,
        DeviceDataMatcher::IsLessThan => observed < threshold,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::TriState;

    fn check(matcher: DeviceDataMatcher, expected: Option<&str>, actual: Option<DeviceValue>) -> TriState {
        let ctx = match actual {
            Some(value) => VisitorContext::new().with_device_data("plan", value),
            None => VisitorContext::new().with_device_data("other", DeviceValue::from("x")),
        };
        evaluate("plan", matcher, expected, &ctx).satisfied
    }

    #[test]
    fn test_numeric_comparison_on_strings() {
        let m = DeviceDataMatcher::IsMoreThan;
        assert_eq!(check(m, Some("3"), Some(DeviceValue::from("5"))), TriState::True);
        assert_eq!(check(m, Some("3"), Some(DeviceValue::from("2"))), TriState::False);
        assert_eq!(check(m, Some("3"), Some(DeviceValue::from("3"))), TriState::False);
        assert_eq!(
            check(DeviceDataMatcher::IsEqualOrMoreThan, Some("3"), Some(DeviceValue::from(3))),
            TriState::True
        );
        assert_eq!(
            check(DeviceDataMatcher::IsLessThan, Some("3"), Some(DeviceValue::from(2.5))),
            TriState::True
        );
        assert_eq!(
            check(DeviceDataMatcher::IsEqualOrLessThan, Some("3"), Some(DeviceValue::from(4))),
            TriState::False
        );
    }

    #[test]
    fn test_numeric_on_non_numeric_fails() {
        assert_eq!(
            check(DeviceDataMatcher::IsMoreThan, Some("3"), Some(DeviceValue::from("gold"))),
            TriState::False
        );
        assert_eq!(
            check(DeviceDataMatcher::IsLessThan, Some("3"), Some(DeviceValue::from(true))),
            TriState::False
        );
    }

    #[test]
    fn test_text_matchers() {
        let gold = || Some(DeviceValue::from("gold-annual"));
        assert_eq!(check(DeviceDataMatcher::Is, Some("gold-annual"), gold()), TriState::True);
        assert_eq!(check(DeviceDataMatcher::Is, Some("gold"), gold()), TriState::False);
        assert_eq!(check(DeviceDataMatcher::IsNot, Some("gold"), gold()), TriState::True);
        assert_eq!(check(DeviceDataMatcher::Contains, Some("gold"), gold()), TriState::True);
        assert_eq!(check(DeviceDataMatcher::DoesNotContain, Some("gold"), gold()), TriState::False);
        assert_eq!(
            check(DeviceDataMatcher::Is, Some("5.0"), Some(DeviceValue::from(5))),
            TriState::True
        );
    }

    #[test]
    fn test_truthiness_matchers() {
        assert_eq!(check(DeviceDataMatcher::IsTrue, None, Some(DeviceValue::from(true))), TriState::True);
        assert_eq!(check(DeviceDataMatcher::IsTrue, None, Some(DeviceValue::from("no"))), TriState::False);
        assert_eq!(check(DeviceDataMatcher::IsTrue, None, None), TriState::False);
        assert_eq!(check(DeviceDataMatcher::IsNotTrue, None, None), TriState::True);
        assert_eq!(
            check(DeviceDataMatcher::IsNotTrue, None, Some(DeviceValue::from(0))),
            TriState::True
        );
    }

    #[test]
    fn test_missing_key_and_missing_map() {
        assert_eq!(check(DeviceDataMatcher::Is, Some("gold"), None), TriState::False);
        assert_eq!(check(DeviceDataMatcher::IsNot, Some("gold"), None), TriState::True);
        assert_eq!(check(DeviceDataMatcher::IsMoreThan, Some("1"), None), TriState::False);

        let result = evaluate("plan", DeviceDataMatcher::Is, Some("gold"), &VisitorContext::new());
        assert_eq!(result.satisfied, TriState::Indeterminate);
    }
}

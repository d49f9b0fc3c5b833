//! Values carried in a visitor's device-data map.
//!
//! Device data arrives from the tag or SDK as loosely typed JSON. A value is
//! a string, a number, or a bool; matchers coerce as needed.

use serde::{Deserialize, Serialize};

/// A single device-data value.
///
/// # Examples
///
/// ```
/// use survey_targeting::DeviceValue;
///
/// let plan = DeviceValue::from("5");
/// assert_eq!(plan.as_number(), Some(5.0));
/// assert!(DeviceValue::Bool(true).is_truthy());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl DeviceValue {
    /// Numeric coercion. Strings are parsed after trimming; bools never coerce.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// String form used by the textual matchers.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(v) => v.to_string(),
            Self::Number(v) => format_number(*v),
            Self::String(s) => s.clone(),
        }
    }

    /// Truthiness for `is_true` / `is_not_true`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(v) => *v,
            Self::Number(v) => *v != 0.0,
            Self::String(s) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("true") || s == "1" || s.eq_ignore_ascii_case("yes")
            }
        }
    }
}

// Whole numbers print without a trailing ".0" so "5" and 5.0 compare equal as text.
#[allow(clippy::cast_possible_truncation)]
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

impl std::fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v:?}"),
            other => write!(f, "{}", other.as_text()),
        }
    }
}

impl From<bool> for DeviceValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for DeviceValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<f64> for DeviceValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for DeviceValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for DeviceValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

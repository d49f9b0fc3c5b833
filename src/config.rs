//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::trigger::DEFAULT_REGEX_SIZE_LIMIT;

/// Retry and timeout policy for DOM queries issued by the diagnostic reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomQueryPolicy {
    /// Attempts per visibility probe while the page reports pending.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_interval_ms: u64,
    /// Budget for all DOM queries of one diagnostic run.
    pub overall_timeout_ms: u64,
}

impl Default for DomQueryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_interval_ms: 1000,
            overall_timeout_ms: 10_000,
        }
    }
}

impl DomQueryPolicy {
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    #[must_use]
    pub const fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

/// Targeting engine configuration.
///
/// ```
/// use survey_targeting::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{"dom_query":{"max_attempts":5}}"#).unwrap();
/// assert_eq!(config.dom_query.max_attempts, 5);
/// assert_eq!(config.dom_query.retry_interval_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dom_query: DomQueryPolicy,
    /// Compiled-size limit for trigger regexes, in bytes.
    pub regex_size_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dom_query: DomQueryPolicy::default(),
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON document; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for malformed JSON or
    /// out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("malformed configuration: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if the file cannot be read or
    /// its contents are invalid.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::OutOfRange` when `max_attempts` is zero and
    /// `InvalidConfig` when the timeout or regex limit is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dom_query.max_attempts == 0 {
            return Err(ValidationError::OutOfRange {
                field: "dom_query.max_attempts",
                value: 0,
                min: 1,
                max: i64::from(u32::MAX),
            });
        }
        if self.dom_query.overall_timeout_ms == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "dom_query.overall_timeout_ms must be positive".to_string(),
            });
        }
        if self.regex_size_limit == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "regex_size_limit must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.dom_query.max_attempts, 3);
        assert_eq!(config.dom_query.retry_interval(), Duration::from_secs(1));
        assert_eq!(config.dom_query.overall_timeout(), Duration::from_secs(10));
        assert_eq!(config.regex_size_limit, 1 << 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"dom_query":{"max_attempts":0}}"#).unwrap_err(),
            ValidationError::OutOfRange { .. }
        ));
        assert!(EngineConfig::from_json_str(r#"{"dom_query":{"overall_timeout_ms":0}}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"regex_size_limit":0}"#).is_err());
        assert!(EngineConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dom_query":{{"retry_interval_ms":250}},"regex_size_limit":4096}}"#).unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.dom_query.retry_interval_ms, 250);
        assert_eq!(config.dom_query.max_attempts, 3);
        assert_eq!(config.regex_size_limit, 4096);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            EngineConfig::from_path(missing).unwrap_err(),
            ValidationError::InvalidConfig { .. }
        ));
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::time::Duration;

use tick::Clock;

use crate::constants::{DEFAULT_THRESHOLD, DEFAULT_TIMEOUT};
use crate::{CircuitBreaker, CircuitBreakerBuilder};

/// Configuration of a circuit breaker, typically loaded from a settings file.
///
/// With the `serde` feature, the options can be deserialized. Missing fields take their
/// default values and the timeout is written as a duration string, either in the friendly
/// format (`"30s"`, `"5m"`) or in ISO 8601 (`"PT5M"`).
///
/// ```rust
/// # #[cfg(feature = "serde")]
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use std::time::Duration;
///
/// use tripwire::CircuitBreakerOptions;
///
/// let options: CircuitBreakerOptions = serde_json::from_str(r#"{ "threshold": 3, "timeout": "30s" }"#)?;
///
/// assert_eq!(options.threshold, 3);
/// assert_eq!(options.timeout, Duration::from_secs(30));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(any(feature = "serde", test), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(any(feature = "serde", test), serde(default))]
pub struct CircuitBreakerOptions {
    /// Number of consecutive significant failures that trip the circuit breaker. Zero is treated as `1`.
    pub threshold: u32,

    /// How long the circuit breaker stays off before it attempts to turn itself on.
    #[cfg_attr(any(feature = "serde", test), serde(with = "duration"))]
    pub timeout: Duration,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CircuitBreakerOptions {
    /// Creates a builder preconfigured with these options.
    pub fn builder(&self, name: impl Into<Cow<'static, str>>, clock: impl AsRef<Clock>) -> CircuitBreakerBuilder {
        CircuitBreaker::builder(name, clock).options(self)
    }

    /// Creates a circuit breaker from these options.
    #[must_use]
    pub fn build(&self, name: impl Into<Cow<'static, str>>, clock: impl AsRef<Clock>) -> CircuitBreaker {
        self.builder(name, clock).build()
    }
}

#[cfg(any(feature = "serde", test))]
mod duration {
    use std::time::Duration;

    use jiff::SignedDuration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let value = SignedDuration::try_from(*value).map_err(serde::ser::Error::custom)?;
        serializer.collect_str(&value)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?
            .parse::<SignedDuration>()
            .map_err(serde::de::Error::custom)?;

        Duration::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;

    #[test]
    fn default_matches_builder_defaults() {
        let options = CircuitBreakerOptions::default();

        assert_eq!(options.threshold, 1);
        assert_eq!(options.timeout, Duration::from_secs(300));
    }

    #[test]
    fn build_applies_options() {
        let options = CircuitBreakerOptions {
            threshold: 4,
            timeout: Duration::from_millis(250),
        };

        let breaker = options.build("database", Clock::new_frozen());

        assert_eq!(breaker.name(), "database");
        assert_eq!(breaker.threshold(), 4);
        assert_eq!(breaker.timeout(), Duration::from_millis(250));
        assert_eq!(breaker.status(), Status::On);
    }

    #[test]
    fn deserialize_friendly_duration() {
        let options: CircuitBreakerOptions = serde_json::from_str(r#"{ "threshold": 3, "timeout": "250ms" }"#).unwrap();

        assert_eq!(options.threshold, 3);
        assert_eq!(options.timeout, Duration::from_millis(250));
    }

    #[test]
    fn deserialize_iso_8601_duration() {
        let options: CircuitBreakerOptions = serde_json::from_str(r#"{ "timeout": "PT5M" }"#).unwrap();

        assert_eq!(options.timeout, Duration::from_secs(300));
    }

    #[test]
    fn deserialize_missing_fields_use_defaults() {
        let options: CircuitBreakerOptions = serde_json::from_str("{}").unwrap();

        assert_eq!(options, CircuitBreakerOptions::default());
    }

    #[test]
    fn deserialize_negative_duration_fails() {
        let error = serde_json::from_str::<CircuitBreakerOptions>(r#"{ "timeout": "-5s" }"#).unwrap_err();

        assert!(error.is_data());
    }

    #[test]
    fn deserialize_invalid_duration_fails() {
        serde_json::from_str::<CircuitBreakerOptions>(r#"{ "timeout": "soon" }"#).unwrap_err();
    }

    #[test]
    fn serialize_then_deserialize() {
        let options = CircuitBreakerOptions {
            threshold: 5,
            timeout: Duration::from_secs(90),
        };

        let json = serde_json::to_string(&options).unwrap();
        let parsed: CircuitBreakerOptions = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, options);
    }
}

use std::{fmt, sync::Arc, time::Duration};

use serde::{
    de::{IgnoredAny, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use serde_json::Value;

use crate::errors::ConfigError;

/// Default wait, in milliseconds, before the first hedge is sent.
pub const DEFAULT_THRESHOLD_MS: i64 = 500;

/// Default interval, in milliseconds, between subsequent hedges.
pub const DEFAULT_THRESHOLD_STEPS_MS: i64 = 100;

/// Identifier of a replica region, e.g. `"West US 2"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "String")]
pub struct RegionId(Arc<str>);

impl RegionId {
    /// Creates a region identifier.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the region name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RegionId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Raw threshold settings as supplied by a configuration source.
///
/// Missing or `null` keys fall back to [`DEFAULT_THRESHOLD_MS`] and
/// [`DEFAULT_THRESHOLD_STEPS_MS`]. Unknown keys are ignored. Only maps are
/// accepted; a positional sequence is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StrategyOptions {
    /// Time in ms before routing to the first alternate region.
    pub threshold_ms: Option<i64>,
    /// Time in ms between each subsequent routing attempt.
    pub threshold_steps_ms: Option<i64>,
}

impl StrategyOptions {
    /// Sets `threshold_ms`.
    pub fn threshold_ms(mut self, value: i64) -> Self {
        self.threshold_ms = Some(value);
        self
    }

    /// Sets `threshold_steps_ms`.
    pub fn threshold_steps_ms(mut self, value: i64) -> Self {
        self.threshold_steps_ms = Some(value);
        self
    }
}

impl<'de> Deserialize<'de> for StrategyOptions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionsVisitor;

        impl<'de> Visitor<'de> for OptionsVisitor {
            type Value = StrategyOptions;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with optional threshold_ms and threshold_steps_ms")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut options = StrategyOptions::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "threshold_ms" => options.threshold_ms = map.next_value()?,
                        "threshold_steps_ms" => options.threshold_steps_ms = map.next_value()?,
                        _ => {
                            map.next_value::<IgnoredAny>()?;
                        }
                    }
                }
                Ok(options)
            }
        }

        deserializer.deserialize_map(OptionsVisitor)
    }
}

/// Validated cross-region hedging thresholds.
///
/// Both thresholds are strictly positive for the lifetime of the value. They
/// are checked once, when the value is built, and cannot change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyConfig {
    threshold: Duration,
    threshold_step: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(DEFAULT_THRESHOLD_MS.unsigned_abs()),
            threshold_step: Duration::from_millis(DEFAULT_THRESHOLD_STEPS_MS.unsigned_abs()),
        }
    }
}

impl StrategyConfig {
    /// Builds a configuration from explicit thresholds.
    ///
    /// Returns [`ConfigError::InvalidConfiguration`] if either value is not
    /// strictly positive.
    pub fn new(threshold_ms: i64, threshold_steps_ms: i64) -> Result<Self, ConfigError> {
        Ok(Self {
            threshold: positive_millis("threshold_ms", threshold_ms)?,
            threshold_step: positive_millis("threshold_steps_ms", threshold_steps_ms)?,
        })
    }

    /// Builds a configuration from a configuration source, defaulting missing keys.
    pub fn from_options(options: &StrategyOptions) -> Result<Self, ConfigError> {
        Self::new(
            options.threshold_ms.unwrap_or(DEFAULT_THRESHOLD_MS),
            options.threshold_steps_ms.unwrap_or(DEFAULT_THRESHOLD_STEPS_MS),
        )
    }

    /// Builds a configuration from a JSON object; `null` yields the defaults.
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => {
                let options = StrategyOptions::deserialize(value)
                    .map_err(|e| ConfigError::Malformed(e.to_string()))?;
                Self::from_options(&options)
            }
            other => Err(ConfigError::Malformed(format!(
                "expected an object with threshold_ms/threshold_steps_ms, got {other}"
            ))),
        }
    }

    /// Wait before the first hedge is sent to the second region.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Interval between each subsequent hedge.
    pub fn threshold_step(&self) -> Duration {
        self.threshold_step
    }

    /// [`threshold`](Self::threshold) in milliseconds.
    pub fn threshold_ms(&self) -> u128 {
        self.threshold.as_millis()
    }

    /// [`threshold_step`](Self::threshold_step) in milliseconds.
    pub fn threshold_steps_ms(&self) -> u128 {
        self.threshold_step.as_millis()
    }

    /// Offset from the start of a race at which the region at `index` is attempted.
    ///
    /// The primary (index 0) starts immediately, index 1 after `threshold`, and
    /// every later index one `threshold_step` after its predecessor.
    pub fn start_offset(&self, index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        u32::try_from(index - 1)
            .ok()
            .and_then(|steps| self.threshold_step.checked_mul(steps))
            .and_then(|d| d.checked_add(self.threshold))
            .unwrap_or(Duration::MAX)
    }
}

fn positive_millis(field: &'static str, value: i64) -> Result<Duration, ConfigError> {
    u64::try_from(value)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or(ConfigError::InvalidConfiguration { field, value })
}

/// Hedging intent exactly as a caller expressed it.
///
/// Deserializes from JSON `true`, `false`, or an object of [`StrategyOptions`].
/// An absent value is modelled as `Option::<RawStrategyInput>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStrategyInput {
    /// `true` enables hedging with default thresholds, `false` disables it.
    Enabled(bool),
    /// Enables hedging with the given thresholds.
    Config(StrategyOptions),
}

impl RawStrategyInput {
    /// Reads an input from a JSON value; `null` means no input was given.
    pub fn from_json(value: &Value) -> Result<Option<Self>, ConfigError> {
        if value.is_null() {
            return Ok(None);
        }
        Self::deserialize(value)
            .map(Some)
            .map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

impl From<bool> for RawStrategyInput {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

impl From<StrategyOptions> for RawStrategyInput {
    fn from(options: StrategyOptions) -> Self {
        Self::Config(options)
    }
}

/// Effective hedging decision at one configuration scope.
///
/// `Unset` means the scope expressed no intent and an outer scope decides.
/// `ExplicitlyDisabled` stops that fallback. Equality is structural.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResolvedStrategy {
    /// No intent at this scope.
    #[default]
    Unset,
    /// Hedging must not run, regardless of outer defaults.
    ExplicitlyDisabled,
    /// Hedging runs with these thresholds.
    Active(StrategyConfig),
}

impl ResolvedStrategy {
    /// Returns `true` for [`ResolvedStrategy::Unset`].
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Returns `true` if hedging is on.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// The active thresholds, if any.
    pub fn config(&self) -> Option<&StrategyConfig> {
        match self {
            Self::Active(config) => Some(config),
            _ => None,
        }
    }

    /// Combines this (outer) scope with an inner scope; the inner wins unless it is unset.
    pub fn overridden_by(self, inner: Self) -> Self {
        if inner.is_unset() {
            self
        } else {
            inner
        }
    }
}

impl fmt::Display for ResolvedStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            Self::ExplicitlyDisabled => f.write_str("disabled"),
            Self::Active(c) => write!(
                f,
                "cross-region hedging (threshold={}ms, step={}ms)",
                c.threshold_ms(),
                c.threshold_steps_ms()
            ),
        }
    }
}

//! Client and per-operation options.

use std::env;

use serde::Deserialize;

use crate::{
    config::{RawStrategyInput, RegionId},
    errors::ConfigError,
};

/// Environment variable holding the comma-separated preferred regions.
pub const REGIONS_ENV: &str = "HEDGING_PREFERRED_REGIONS";

/// Environment variable holding the client-level strategy as JSON
/// (`true`, `false`, or `{"threshold_ms": .., "threshold_steps_ms": ..}`).
pub const STRATEGY_ENV: &str = "HEDGING_AVAILABILITY_STRATEGY";

/// Options supplied when building a [`HedgedRegionClient`](crate::HedgedRegionClient).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientOptions {
    /// Regions in preference order; the first one is the primary.
    pub preferred_regions: Vec<RegionId>,

    /// Client-level hedging intent. `None` leaves hedging unset.
    #[serde(default)]
    pub availability_strategy: Option<RawStrategyInput>,
}

impl ClientOptions {
    /// Creates options for the given preferred regions, with no strategy set.
    pub fn new<I, R>(preferred_regions: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RegionId>,
    {
        Self {
            preferred_regions: preferred_regions.into_iter().map(Into::into).collect(),
            availability_strategy: None,
        }
    }

    /// Sets the client-level strategy.
    pub fn availability_strategy(mut self, strategy: impl Into<RawStrategyInput>) -> Self {
        self.availability_strategy = Some(strategy.into());
        self
    }

    /// Parses options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Loads options from [`REGIONS_ENV`] and [`STRATEGY_ENV`].
    ///
    /// Returns an error if no region is configured or the strategy is not valid JSON.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw_regions = lookup(REGIONS_ENV).ok_or(ConfigError::MissingEnv(REGIONS_ENV))?;
        let preferred_regions: Vec<RegionId> = raw_regions
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(RegionId::from)
            .collect();
        if preferred_regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }

        let availability_strategy = match lookup(STRATEGY_ENV) {
            Some(raw) if !raw.trim().is_empty() => {
                let value: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(|e| ConfigError::Malformed(format!("{STRATEGY_ENV}: {e}")))?;
                RawStrategyInput::from_json(&value)?
            }
            _ => None,
        };

        Ok(Self {
            preferred_regions,
            availability_strategy,
        })
    }
}

/// Per-operation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct OperationOptions {
    /// Operation-level hedging override. `None` defers to the client default.
    #[serde(default)]
    pub availability_strategy: Option<RawStrategyInput>,
}

impl OperationOptions {
    /// Options with no override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the client strategy for this operation.
    pub fn availability_strategy(mut self, strategy: impl Into<RawStrategyInput>) -> Self {
        self.availability_strategy = Some(strategy.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::StrategyOptions;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn from_json_reads_all_strategy_forms() {
        let options = ClientOptions::from_json(
            r#"{"preferred_regions": ["West US", "East US"], "availability_strategy": {"threshold_ms": 200}}"#,
        )
        .unwrap();
        assert_eq!(
            options,
            ClientOptions::new(["West US", "East US"])
                .availability_strategy(StrategyOptions::default().threshold_ms(200))
        );

        let disabled =
            ClientOptions::from_json(r#"{"preferred_regions": ["a"], "availability_strategy": false}"#)
                .unwrap();
        assert_eq!(disabled.availability_strategy, Some(RawStrategyInput::Enabled(false)));

        let unset = ClientOptions::from_json(r#"{"preferred_regions": ["a"]}"#).unwrap();
        assert_eq!(unset.availability_strategy, None);
    }

    #[test]
    fn operation_options_deserialize() {
        let options: OperationOptions =
            serde_json::from_str(r#"{"availability_strategy": true}"#).unwrap();
        assert_eq!(options, OperationOptions::new().availability_strategy(true));
    }

    #[test]
    fn operation_options_reject_positional_thresholds() {
        let result =
            serde_json::from_str::<OperationOptions>(r#"{"availability_strategy": [200, 50]}"#);
        assert!(result.is_err());

        let client = ClientOptions::from_json(
            r#"{"preferred_regions": ["a"], "availability_strategy": [200, 50]}"#,
        );
        assert!(matches!(client, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn env_lookup_parses_regions_and_strategy() {
        let options = ClientOptions::from_lookup(lookup(&[
            (REGIONS_ENV, " West US , ,East US"),
            (STRATEGY_ENV, r#"{"threshold_steps_ms": 25}"#),
        ]))
        .unwrap();

        assert_eq!(
            options.preferred_regions,
            vec![RegionId::from("West US"), RegionId::from("East US")]
        );
        assert_eq!(
            options.availability_strategy,
            Some(RawStrategyInput::Config(
                StrategyOptions::default().threshold_steps_ms(25)
            ))
        );
    }

    #[test]
    fn env_lookup_requires_regions() {
        assert_eq!(
            ClientOptions::from_lookup(lookup(&[])),
            Err(ConfigError::MissingEnv(REGIONS_ENV))
        );
        assert_eq!(
            ClientOptions::from_lookup(lookup(&[(REGIONS_ENV, " , ")])),
            Err(ConfigError::NoRegions)
        );
    }

    #[test]
    fn env_lookup_rejects_malformed_strategy() {
        let result = ClientOptions::from_lookup(lookup(&[
            (REGIONS_ENV, "West US"),
            (STRATEGY_ENV, "yes please"),
        ]));
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }
}

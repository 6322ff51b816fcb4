use std::fmt;

use crate::config::RegionId;

/// Errors raised while building a hedging strategy or client configuration.
///
/// These are always surfaced synchronously at construction time, never from
/// inside a race.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A threshold was zero or negative.
    #[error("{field} must be positive, got {value}")]
    InvalidConfiguration {
        /// Name of the offending key (`threshold_ms` or `threshold_steps_ms`).
        field: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// The configuration source could not be read as a strategy.
    #[error("malformed availability strategy: {0}")]
    Malformed(String),

    /// A required environment variable was not set.
    #[error("environment variable not set: {0}")]
    MissingEnv(&'static str),

    /// The client was configured without any preferred region.
    #[error("no preferred regions configured")]
    NoRegions,
}

/// A single region's failed attempt, recorded during a race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure<E> {
    /// Region the attempt was sent to.
    pub region: RegionId,
    /// Error returned by the attempt callback.
    pub error: E,
}

/// Every region attempted in a race failed.
///
/// Failures are kept in region order, one entry per attempted region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedError<E> {
    failures: Vec<AttemptFailure<E>>,
}

impl<E> AggregatedError<E> {
    pub(crate) fn new(failures: Vec<AttemptFailure<E>>) -> Self {
        Self { failures }
    }

    /// Per-region failures, in region order.
    pub fn failures(&self) -> &[AttemptFailure<E>] {
        &self.failures
    }

    /// Number of failed attempts.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns `true` if no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Consumes the error, returning the per-region failures.
    pub fn into_failures(self) -> Vec<AttemptFailure<E>> {
        self.failures
    }
}

impl<E: fmt::Display> fmt::Display for AggregatedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} region(s) failed", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{}: {}", failure.region, failure.error)?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AggregatedError<E> {}

/// Errors that can occur during hedged operations.
#[derive(thiserror::Error, Debug)]
pub enum HedgedError<E> {
    /// No candidate regions were supplied; no attempt was made.
    #[error("no regions to attempt")]
    NoRegions,

    /// All attempted regions returned errors.
    #[error("all regions failed: {0}")]
    AllFailed(AggregatedError<E>),

    /// The per-operation strategy override was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl<E> HedgedError<E> {
    /// Returns the aggregated per-region failures, if every region failed.
    pub fn aggregated(&self) -> Option<&AggregatedError<E>> {
        match self {
            Self::AllFailed(agg) => Some(agg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_display_lists_regions_in_order() {
        let err = AggregatedError::new(vec![
            AttemptFailure {
                region: RegionId::from("West US"),
                error: "timeout",
            },
            AttemptFailure {
                region: RegionId::from("East US"),
                error: "503",
            },
        ]);

        assert_eq!(
            err.to_string(),
            "2 region(s) failed: West US: timeout; East US: 503"
        );
    }

    #[test]
    fn hedged_error_exposes_aggregate() {
        let err: HedgedError<&str> = HedgedError::AllFailed(AggregatedError::new(vec![]));
        assert!(err.aggregated().is_some_and(AggregatedError::is_empty));
        assert!(HedgedError::<&str>::NoRegions.aggregated().is_none());
    }

    #[test]
    fn config_error_message_names_field() {
        let err = ConfigError::InvalidConfiguration {
            field: "threshold_ms",
            value: 0,
        };
        assert_eq!(err.to_string(), "threshold_ms must be positive, got 0");
    }
}

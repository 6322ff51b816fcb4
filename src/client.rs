use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::time::Instant;
use tracing::debug;

use crate::{
    config::{RegionId, ResolvedStrategy},
    errors::{ConfigError, HedgedError},
    executor::{attempt_once, HedgingExecutor},
    options::{ClientOptions, OperationOptions},
    resolver::StrategyResolver,
};

#[derive(Debug, Default)]
struct RegionStats {
    wins: u64,
    total_latency_ms: f64,
    errors: u64,
}

/// Snapshot of per-region performance statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStatsSnapshot {
    /// Number of operations this region won.
    pub wins: u64,
    /// Average end-to-end latency in milliseconds of the operations it won.
    pub avg_latency_ms: f64,
    /// Number of failed attempts sent to this region.
    pub errors: u64,
}

/// A client for a multi-region replicated service that hedges reads across regions.
///
/// The client owns the preferred-region order and the client-level hedging
/// default. Each operation may override that default; the effective strategy
/// decides whether the operation is raced across regions or sent to the
/// primary region only. The request itself is performed by the caller's
/// attempt callback.
#[derive(Clone)]
pub struct HedgedRegionClient {
    regions: Arc<Vec<RegionId>>,
    default_strategy: ResolvedStrategy,
    stats: Arc<Mutex<HashMap<RegionId, RegionStats>>>,
}

impl fmt::Debug for HedgedRegionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgedRegionClient")
            .field("regions", &self.regions)
            .field("default_strategy", &self.default_strategy)
            .finish_non_exhaustive()
    }
}

impl HedgedRegionClient {
    /// Creates a client from its options.
    ///
    /// The client-level strategy is validated here, once.
    ///
    /// # Example
    /// ```
    /// use hedged_region_client::{ClientOptions, HedgedRegionClient, StrategyOptions};
    ///
    /// let options = ClientOptions::new(["West US", "East US", "North Europe"])
    ///     .availability_strategy(StrategyOptions::default().threshold_ms(200));
    ///
    /// let client = HedgedRegionClient::new(options).unwrap();
    /// assert!(client.default_strategy().is_active());
    /// ```
    pub fn new(options: ClientOptions) -> Result<Self, ConfigError> {
        if options.preferred_regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        let default_strategy =
            StrategyResolver::interpret(options.availability_strategy.as_ref())?;

        let stats_map: HashMap<RegionId, RegionStats> = options
            .preferred_regions
            .iter()
            .map(|region| (region.clone(), RegionStats::default()))
            .collect();

        Ok(Self {
            regions: Arc::new(options.preferred_regions),
            default_strategy,
            stats: Arc::new(Mutex::new(stats_map)),
        })
    }

    /// Preferred regions, primary first.
    pub fn regions(&self) -> &[RegionId] {
        &self.regions
    }

    /// The client-level strategy resolved at construction.
    pub fn default_strategy(&self) -> &ResolvedStrategy {
        &self.default_strategy
    }

    /// The strategy an operation with these options would run with.
    pub fn effective_strategy(
        &self,
        options: &OperationOptions,
    ) -> Result<ResolvedStrategy, ConfigError> {
        StrategyResolver::resolve(&self.default_strategy, options.availability_strategy.as_ref())
    }

    /// Returns a snapshot of accumulated statistics for each region.
    pub fn region_stats(&self) -> HashMap<RegionId, RegionStatsSnapshot> {
        lock_stats(&self.stats)
            .iter()
            .map(|(region, s)| {
                let avg = if s.wins > 0 {
                    s.total_latency_ms / (s.wins as f64)
                } else {
                    0.0
                };

                (
                    region.clone(),
                    RegionStatsSnapshot {
                        wins: s.wins,
                        avg_latency_ms: avg,
                        errors: s.errors,
                    },
                )
            })
            .collect()
    }

    /// Runs an operation under its effective hedging strategy.
    ///
    /// With an active strategy the operation is raced across the preferred
    /// regions; otherwise it is sent to the primary region only. Returns the
    /// value together with the region that produced it.
    pub async fn execute<T, E, F, Fut>(
        &self,
        options: &OperationOptions,
        mut attempt: F,
    ) -> Result<(RegionId, T), HedgedError<E>>
    where
        F: FnMut(RegionId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let strategy = self.effective_strategy(options)?;
        debug!(strategy = %strategy, regions = self.regions.len(), "executing operation");

        let stats = Arc::clone(&self.stats);
        let tracked = move |region: RegionId| {
            let fut = attempt(region.clone());
            let stats = Arc::clone(&stats);
            async move {
                let result = fut.await;
                if result.is_err() {
                    if let Some(entry) = lock_stats(&stats).get_mut(&region) {
                        entry.errors += 1;
                    }
                }
                result
            }
        };

        let start = Instant::now();
        let outcome = match (strategy, self.regions.first()) {
            (_, None) => Err(HedgedError::NoRegions),
            (ResolvedStrategy::Active(config), Some(_)) => {
                HedgingExecutor::new(config).run(&self.regions, tracked).await
            }
            (ResolvedStrategy::Unset | ResolvedStrategy::ExplicitlyDisabled, Some(primary)) => {
                attempt_once(primary.clone(), tracked).await
            }
        };

        if let Ok((winner, _)) = &outcome {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            if let Some(entry) = lock_stats(&self.stats).get_mut(winner) {
                entry.wins += 1;
                entry.total_latency_ms += elapsed_ms;
            }
        }

        outcome
    }

    /// Runs an operation, returning only the value without region information.
    pub async fn execute_any<T, E, F, Fut>(
        &self,
        options: &OperationOptions,
        attempt: F,
    ) -> Result<T, HedgedError<E>>
    where
        F: FnMut(RegionId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let (_region, value) = self.execute(options, attempt).await?;
        Ok(value)
    }
}

fn lock_stats(
    stats: &Mutex<HashMap<RegionId, RegionStats>>,
) -> MutexGuard<'_, HashMap<RegionId, RegionStats>> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Staggered cross-region race.
//!
//! The primary region is attempted immediately. The second region starts
//! after `threshold`, and each later region one `threshold_step` after the
//! previous one. The first successful attempt wins; every other attempt is
//! dropped, which cancels in-flight work and prevents not-yet-started
//! attempts from ever being invoked.

use std::{fmt, future::Future, time::Duration};

use futures::{stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::{
    config::{RegionId, StrategyConfig},
    errors::{AggregatedError, AttemptFailure, HedgedError},
};

// Start offsets are capped at the horizon tokio uses for timers that never fire,
// so very large thresholds cannot overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A region attempt that was started, tagged with its position in the region list.
#[derive(Debug)]
struct RaceAttempt {
    index: usize,
    region: RegionId,
    started_at: Instant,
}

/// Internal result of one turn of the race loop.
enum RaceEvent<T, E> {
    /// One or more attempts finished on the same wake-up.
    Completed(Vec<(RaceAttempt, Result<T, E>)>),
    /// The next region's start time was reached.
    LaunchDue,
    /// Nothing is in flight and nothing is left to start.
    Exhausted,
}

async fn tagged<Fut: Future>(attempt: RaceAttempt, future: Fut) -> (RaceAttempt, Fut::Output) {
    let output = future.await;
    (attempt, output)
}

/// Runs one operation against an ordered list of regions using staggered hedging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HedgingExecutor {
    config: StrategyConfig,
}

impl HedgingExecutor {
    /// Creates an executor for the given thresholds.
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Thresholds this executor races with.
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Start offsets, relative to the start of a race, for `region_count` regions.
    pub fn schedule(&self, region_count: usize) -> impl Iterator<Item = Duration> {
        let config = self.config;
        (0..region_count).map(move |index| config.start_offset(index).min(FAR_FUTURE))
    }

    /// Races `attempt` across `regions` and returns the first success.
    ///
    /// The winning region is returned alongside the value. If every region
    /// fails, the per-region errors are returned in region order. A single
    /// region is attempted directly, with no scheduling. Duplicate regions are
    /// attempted independently. When several attempts finish on the same
    /// wake-up, the earliest region in `regions` wins.
    ///
    /// Attempts are polled on the calling task, not spawned. The futures
    /// returned by `attempt` must therefore not block the thread: a blocking
    /// attempt also stalls the hedge timer and every other attempt. Wrap
    /// blocking work in [`tokio::task::spawn_blocking`] inside the callback.
    ///
    /// # Errors
    ///
    /// [`HedgedError::NoRegions`] if `regions` is empty (no attempt is made),
    /// [`HedgedError::AllFailed`] if every attempt failed.
    pub async fn run<T, E, F, Fut>(
        &self,
        regions: &[RegionId],
        mut attempt: F,
    ) -> Result<(RegionId, T), HedgedError<E>>
    where
        F: FnMut(RegionId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        match regions {
            [] => return Err(HedgedError::NoRegions),
            [only] => return attempt_once(only.clone(), attempt).await,
            _ => {}
        }

        let race_start = Instant::now();
        let offsets: Vec<Duration> = self.schedule(regions.len()).collect();
        let mut futs = FuturesUnordered::new();
        let mut failures: Vec<Option<AttemptFailure<E>>> =
            regions.iter().map(|_| None).collect();
        let mut next = 0;

        loop {
            let now = Instant::now();
            while let (Some(region), Some(offset)) = (regions.get(next), offsets.get(next)) {
                if race_start + *offset > now {
                    break;
                }
                debug!(
                    region = %region,
                    attempt = next,
                    offset_ms = offset.as_millis(),
                    "starting regional attempt"
                );
                let started = RaceAttempt {
                    index: next,
                    region: region.clone(),
                    started_at: now,
                };
                futs.push(tagged(started, attempt(region.clone())));
                next += 1;
            }

            let next_due = offsets.get(next).map(|offset| race_start + *offset);

            let event = tokio::select! {
                biased;
                Some(first) = futs.next(), if !futs.is_empty() => {
                    // Collect siblings that finished on the same wake-up so the
                    // earliest region wins a tie.
                    let mut batch = vec![first];
                    while let Some(Some(done)) = futs.next().now_or_never() {
                        batch.push(done);
                    }
                    batch.sort_by_key(|(finished, _)| finished.index);
                    RaceEvent::Completed(batch)
                }
                () = time::sleep_until(next_due.unwrap_or(now)), if next_due.is_some() => {
                    RaceEvent::LaunchDue
                }
                else => RaceEvent::Exhausted,
            };

            match event {
                RaceEvent::Completed(batch) => {
                    for (finished, result) in batch {
                        match result {
                            Ok(value) => {
                                if finished.index > 0 {
                                    info!(
                                        region = %finished.region,
                                        attempt = finished.index,
                                        cancelled = futs.len(),
                                        latency_ms = finished.started_at.elapsed().as_millis(),
                                        "hedged attempt won the race"
                                    );
                                } else {
                                    debug!(
                                        region = %finished.region,
                                        cancelled = futs.len(),
                                        "primary region won the race"
                                    );
                                }
                                return Ok((finished.region, value));
                            }
                            Err(error) => {
                                debug!(
                                    region = %finished.region,
                                    attempt = finished.index,
                                    error = %error,
                                    "regional attempt failed"
                                );
                                if let Some(slot) = failures.get_mut(finished.index) {
                                    *slot = Some(AttemptFailure {
                                        region: finished.region,
                                        error,
                                    });
                                }
                            }
                        }
                    }
                }
                RaceEvent::LaunchDue => {}
                RaceEvent::Exhausted => break,
            }
        }

        let failures: Vec<AttemptFailure<E>> = failures.into_iter().flatten().collect();
        warn!(regions = failures.len(), "all regional attempts failed");
        Err(HedgedError::AllFailed(AggregatedError::new(failures)))
    }
}

/// Runs a single attempt with no scheduling or hedging.
pub(crate) async fn attempt_once<T, E, F, Fut>(
    region: RegionId,
    mut attempt: F,
) -> Result<(RegionId, T), HedgedError<E>>
where
    F: FnMut(RegionId) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match attempt(region.clone()).await {
        Ok(value) => Ok((region, value)),
        Err(error) => Err(HedgedError::AllFailed(AggregatedError::new(vec![
            AttemptFailure { region, error },
        ]))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::*;

    type Calls = Arc<Mutex<Vec<(RegionId, Duration)>>>;

    fn regions(names: &[&str]) -> Vec<RegionId> {
        names.iter().copied().map(RegionId::from).collect()
    }

    fn executor(threshold_ms: i64, threshold_steps_ms: i64) -> HedgingExecutor {
        HedgingExecutor::new(StrategyConfig::new(threshold_ms, threshold_steps_ms).unwrap())
    }

    fn assert_near(actual: Duration, expected_ms: u64) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(5),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    /// Attempt callback whose per-region latency and outcome are scripted.
    fn scripted(
        script: &[(&'static str, u64, Result<&'static str, &'static str>)],
        calls: &Calls,
        race_start: Instant,
    ) -> impl FnMut(RegionId) -> futures::future::BoxFuture<'static, Result<&'static str, &'static str>>
    {
        let script = script.to_vec();
        let calls = Arc::clone(calls);
        move |region: RegionId| {
            calls
                .lock()
                .unwrap()
                .push((region.clone(), race_start.elapsed()));
            let (delay_ms, outcome) = script
                .iter()
                .find(|(name, _, _)| *name == region.as_str())
                .map(|(_, delay, outcome)| (*delay, *outcome))
                .unwrap();
            async move {
                if delay_ms > 0 {
                    time::sleep(Duration::from_millis(delay_ms)).await;
                }
                outcome
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hedge_wins_after_primary_fails() {
        let calls = Calls::default();
        let start = Instant::now();
        let attempt = scripted(
            &[
                ("R1", 50, Err("primary unavailable")),
                ("R2", 60, Ok("from R2")),
                ("R3", 1, Ok("from R3")),
            ],
            &calls,
            start,
        );

        let result = executor(500, 100)
            .run(&regions(&["R1", "R2", "R3"]), attempt)
            .await;

        assert_eq!(result.unwrap(), (RegionId::from("R2"), "from R2"));
        assert_near(start.elapsed(), 560);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2, "R3 must never start: {calls:?}");
        assert_eq!(calls[0].0.as_str(), "R1");
        assert_near(calls[0].1, 0);
        assert_eq!(calls[1].0.as_str(), "R2");
        assert_near(calls[1].1, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_primary_never_hedges() {
        let calls = Calls::default();
        let start = Instant::now();
        let attempt = scripted(&[("R1", 100, Ok("primary")), ("R2", 1, Ok("hedge"))], &calls, start);

        let result = executor(500, 100).run(&regions(&["R1", "R2"]), attempt).await;

        assert_eq!(result.unwrap().1, "primary");
        assert_near(start.elapsed(), 100);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_are_aggregated_in_region_order() {
        let calls = Calls::default();
        let start = Instant::now();
        let attempt = scripted(
            &[
                ("R1", 2_000, Err("e1")),
                ("R2", 10, Err("e2")),
                ("R3", 1, Err("e3")),
            ],
            &calls,
            start,
        );

        let err = executor(500, 100)
            .run(&regions(&["R1", "R2", "R3"]), attempt)
            .await
            .unwrap_err();

        let agg = err.aggregated().unwrap();
        let seen: Vec<(&str, &str)> = agg
            .failures()
            .iter()
            .map(|f| (f.region.as_str(), f.error))
            .collect();
        assert_eq!(seen, vec![("R1", "e1"), ("R2", "e2"), ("R3", "e3")]);
        assert_near(start.elapsed(), 2_000);
    }

    #[tokio::test(start_paused = true)]
    async fn later_regions_keep_original_schedule_after_failures() {
        let calls = Calls::default();
        let start = Instant::now();
        let attempt = scripted(
            &[("R1", 1, Err("e1")), ("R2", 1, Err("e2")), ("R3", 5, Ok("R3"))],
            &calls,
            start,
        );

        let result = executor(300, 50)
            .run(&regions(&["R1", "R2", "R3"]), attempt)
            .await;

        assert_eq!(result.unwrap().1, "R3");
        let calls = calls.lock().unwrap();
        assert_near(calls[1].1, 300);
        assert_near(calls[2].1, 350);
    }

    #[tokio::test(start_paused = true)]
    async fn single_region_runs_without_waiting() {
        let calls = Calls::default();
        let start = Instant::now();
        let attempt = scripted(&[("only", 0, Err("boom"))], &calls, start);

        let err = executor(10_000, 10_000)
            .run(&regions(&["only"]), attempt)
            .await
            .unwrap_err();

        assert_eq!(err.aggregated().map(AggregatedError::len), Some(1));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn empty_region_list_is_rejected_without_attempts() {
        let invoked = AtomicUsize::new(0);
        let result = executor(500, 100)
            .run(&[], |_region| {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), &str>(()) }
            })
            .await;

        assert!(matches!(result, Err(HedgedError::NoRegions)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_regions_are_attempted_independently() {
        let calls = Calls::default();
        let start = Instant::now();
        let attempt = scripted(&[("R1", 700, Err("slow failure"))], &calls, start);

        let err = executor(100, 100)
            .run(&regions(&["R1", "R1"]), attempt)
            .await
            .unwrap_err();

        assert_eq!(err.aggregated().map(AggregatedError::len), Some(2));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_successes_go_to_earliest_region() {
        let start = Instant::now();
        let gate = time::sleep_until(start + Duration::from_millis(650)).shared();

        let result = executor(500, 100)
            .run(&regions(&["R1", "R2", "R3"]), |region| {
                let gate = gate.clone();
                async move {
                    if region.as_str() == "R1" {
                        time::sleep(Duration::from_secs(3_600)).await;
                    } else {
                        gate.await;
                    }
                    Ok::<_, &str>(region)
                }
            })
            .await;

        assert_eq!(result.unwrap().0.as_str(), "R2");
    }

    struct CancelGuard {
        finished: bool,
        cancelled: Arc<AtomicUsize>,
    }

    impl Drop for CancelGuard {
        fn drop(&mut self) {
            if !self.finished {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn losing_attempts_are_cancelled() {
        let cancelled = Arc::new(AtomicUsize::new(0));

        let result = executor(100, 100)
            .run(&regions(&["slow", "fast"]), |region| {
                let cancelled = Arc::clone(&cancelled);
                async move {
                    let mut guard = CancelGuard {
                        finished: false,
                        cancelled,
                    };
                    let delay = if region.as_str() == "slow" { 5_000 } else { 10 };
                    time::sleep(Duration::from_millis(delay)).await;
                    guard.finished = true;
                    Ok::<_, &str>(region)
                }
            })
            .await;

        assert_eq!(result.unwrap().0.as_str(), "fast");
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn schedule_reports_offsets() {
        let offsets: Vec<u128> = executor(200, 25)
            .schedule(4)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 200, 225, 250]);
    }

    #[test]
    fn schedule_caps_huge_thresholds() {
        let offsets: Vec<Duration> = executor(i64::MAX, i64::MAX).schedule(3).collect();
        assert_eq!(offsets, vec![Duration::ZERO, FAR_FUTURE, FAR_FUTURE]);
    }
}

//! Cross-region request hedging for clients of multi-region replicated services.
//!
//! This library races a read across replica regions, trading extra requests
//! for lower tail latency. The primary region is tried first; if it has not
//! answered after `threshold_ms`, the next region is tried, then one more every
//! `threshold_steps_ms`. The first successful response wins and the remaining
//! attempts are cancelled.
//!
//! # Quick Start
//!
//! ```no_run
//! use hedged_region_client::{ClientOptions, HedgedRegionClient, OperationOptions, RegionId};
//!
//! # async fn read_item(region: RegionId) -> Result<String, std::io::Error> { Ok(region.to_string()) }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClientOptions::new(["West US", "East US", "North Europe"])
//!     .availability_strategy(true);
//! let client = HedgedRegionClient::new(options)?;
//!
//! let (region, item) = client.execute(&OperationOptions::new(), read_item).await?;
//! println!("Got {item} from {region}");
//! # Ok(())
//! # }
//! ```
//!
//! # Strategy Resolution
//!
//! Hedging intent can be given when the client is built and again per
//! operation. Each scope is one of:
//! 1. unset: defer to the outer scope
//! 2. `false`: hedging is explicitly disabled, whatever the outer scope says
//! 3. `true` or a threshold map: hedging is active
//!
//! See [`StrategyResolver`] for the folding rules and [`HedgingExecutor`] for
//! the race itself.

pub mod client;
pub mod config;
pub mod errors;
pub mod executor;
pub mod options;
pub mod resolver;

pub use client::{HedgedRegionClient, RegionStatsSnapshot};
pub use config::{
    RawStrategyInput, RegionId, ResolvedStrategy, StrategyConfig, StrategyOptions,
    DEFAULT_THRESHOLD_MS, DEFAULT_THRESHOLD_STEPS_MS,
};
pub use errors::{AggregatedError, AttemptFailure, ConfigError, HedgedError};
pub use executor::HedgingExecutor;
pub use options::{ClientOptions, OperationOptions};
pub use resolver::StrategyResolver;

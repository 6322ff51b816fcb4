//! Builds a client from environment variables and runs a few hedged reads.
//!
//! ```text
//! HEDGING_PREFERRED_REGIONS="West US,East US" \
//! HEDGING_AVAILABILITY_STRATEGY='{"threshold_ms": 150}' \
//! cargo run --example client_from_env
//! ```

use std::time::{Duration, Instant};

use color_eyre::{eyre::WrapErr, Result};
use hedged_region_client::{
    options::{REGIONS_ENV, STRATEGY_ENV},
    ClientOptions, HedgedRegionClient, OperationOptions, RegionId,
};
use tracing_subscriber::EnvFilter;

async fn read_item(region: RegionId, round: u32) -> anyhow::Result<u32> {
    // Rotate which region is slow so each one gets a chance to lose.
    let slow = region.as_str().len() % 3 == (round % 3) as usize;
    let latency_ms = if slow { 400 } else { 60 };
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;
    Ok(round)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = ClientOptions::from_env()
        .wrap_err_with(|| format!("set {REGIONS_ENV} (and optionally {STRATEGY_ENV})"))?;
    let client = HedgedRegionClient::new(options)?;

    eprintln!(
        "Using regions:\n{}",
        client
            .regions()
            .iter()
            .map(|r| format!("- {r}"))
            .collect::<Vec<_>>()
            .join("\n")
    );
    eprintln!("Client strategy: {}", client.default_strategy());

    for round in 0..5 {
        let start = Instant::now();
        match client
            .execute(&OperationOptions::new(), |region| read_item(region, round))
            .await
        {
            Ok((region, value)) => {
                println!("round {round}: {value} from {region} in {:?}", start.elapsed())
            }
            Err(e) => println!("round {round}: failed after {:?}: {e}", start.elapsed()),
        }
    }

    println!("\n=== region stats ===");
    for (region, s) in client.region_stats() {
        println!(
            "{region:>15}: wins = {}, avg_latency = {:.1} ms, errors = {}",
            s.wins, s.avg_latency_ms, s.errors
        );
    }

    Ok(())
}

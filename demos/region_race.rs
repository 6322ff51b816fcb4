//! High-volume simulation of hedged reads across three regions.
//!
//! Each simulated region has its own latency profile; the primary region
//! occasionally stalls, which is where hedging pays off. The summary shows
//! how often each region won and the resulting average latency.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use color_eyre::Result;
use hedged_region_client::{
    ClientOptions, HedgedRegionClient, OperationOptions, RegionId, StrategyOptions,
};
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

const NUM_CALLS: u64 = 2_000;
const MAX_IN_FLIGHT: usize = 128;

/// Pretends to read an item from `region`. The primary stalls on every 7th call
/// and fails on every 50th.
async fn read_item(region: RegionId, call_idx: u64) -> anyhow::Result<u64> {
    let latency_ms = match region.as_str() {
        "West US" if call_idx % 7 == 0 => 900,
        "West US" => 40,
        "East US" => 70,
        _ => 120,
    };
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;

    if region.as_str() == "West US" && call_idx % 50 == 0 {
        anyhow::bail!("{region} returned 503 for item {call_idx}");
    }
    Ok(call_idx)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = ClientOptions::new(["West US", "East US", "North Europe"])
        .availability_strategy(StrategyOptions::default().threshold_ms(100).threshold_steps_ms(50));
    let client = HedgedRegionClient::new(options)?;
    println!("strategy: {}", client.default_strategy());

    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut handles = Vec::with_capacity(NUM_CALLS as usize);
    let started = Instant::now();

    for i in 0..NUM_CALLS {
        let client = client.clone();
        let sem = semaphore.clone();

        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await?;
            let start = Instant::now();
            let res = client
                .execute(&OperationOptions::new(), |region| read_item(region, i))
                .await;
            Ok::<_, color_eyre::Report>((res.is_ok(), start.elapsed()))
        }));
    }

    let mut errors = 0u64;
    let mut total_latency = Duration::ZERO;
    for handle in handles {
        let (ok, latency) = handle.await??;
        if !ok {
            errors += 1;
        }
        total_latency += latency;
    }

    println!("\n=== summary ===");
    println!("total calls          : {NUM_CALLS}");
    println!("errors               : {errors}");
    println!("wall time            : {:?}", started.elapsed());
    println!(
        "avg latency          : {:.1} ms",
        total_latency.as_secs_f64() * 1000.0 / NUM_CALLS as f64
    );

    let mut stats: Vec<_> = client.region_stats().into_iter().collect();
    stats.sort_by(|a, b| a.0.cmp(&b.0));
    for (region, s) in stats {
        println!(
            "region {:>13}: wins = {:5}, avg_latency = {:7.1} ms, errors = {}",
            region, s.wins, s.avg_latency_ms, s.errors
        );
    }

    Ok(())
}

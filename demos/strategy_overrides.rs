//! Walks through client-level and per-operation strategy combinations.
//!
//! For each combination the effective strategy is printed and one simulated
//! read is executed, showing which region served it.

use std::time::{Duration, Instant};

use color_eyre::Result;
use hedged_region_client::{
    ClientOptions, HedgedRegionClient, OperationOptions, RawStrategyInput, RegionId,
    StrategyOptions,
};
use tracing_subscriber::EnvFilter;

/// The primary region is slow; the others answer quickly.
async fn read_item(region: RegionId) -> anyhow::Result<String> {
    let latency_ms = if region.as_str() == "West US" { 800 } else { 30 };
    tokio::time::sleep(Duration::from_millis(latency_ms)).await;
    Ok(format!("item@{region}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client_defaults: [(&str, Option<RawStrategyInput>); 3] = [
        ("unset", None),
        ("enabled", Some(true.into())),
        ("disabled", Some(false.into())),
    ];
    let overrides: [(&str, OperationOptions); 3] = [
        ("none", OperationOptions::new()),
        ("false", OperationOptions::new().availability_strategy(false)),
        (
            "threshold_ms=200",
            OperationOptions::new()
                .availability_strategy(StrategyOptions::default().threshold_ms(200)),
        ),
    ];

    for (client_label, client_strategy) in client_defaults {
        let mut options = ClientOptions::new(["West US", "East US", "North Europe"]);
        options.availability_strategy = client_strategy;
        let client = HedgedRegionClient::new(options)?;

        for (op_label, op) in &overrides {
            let effective = client.effective_strategy(op)?;
            let start = Instant::now();
            let (region, item) = client.execute(op, read_item).await?;
            println!(
                "client={client_label:<8} op={op_label:<16} -> {effective} served by {region} ({item}) in {:?}",
                start.elapsed()
            );
        }
    }

    Ok(())
}

mod reading;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use rand::Rng;
use reading::Reading;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "simulator", about = "Devices reporting random readings to the backend")]
struct Args {
    /// Base URL of the telemetry backend
    #[arg(long, env = "API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Readings per second across all devices
    #[arg(long, env = "RATE", default_value_t = 10)]
    rate: u64,

    #[arg(long, env = "DEVICES", default_value_t = 5)]
    devices: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting device simulator");
    info!(
        "Backend: {}, Rate: {} readings/s, Devices: {}",
        args.api_url, args.rate, args.devices
    );

    let endpoint = format!("{}/api/data", args.api_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let mut rng = rand::thread_rng();
    let mut attempts = 0u64;
    let mut counter = 0u64;
    let mut failures = 0u64;

    let pause = Duration::from_millis(1000 / args.rate.max(1));
    let num_devices = args.devices.max(1) as u64;

    loop {
        let started = std::time::Instant::now();
        let device_id = format!("dev-{}", attempts % num_devices);
        attempts += 1;
        let reading = generate_reading(&mut rng, device_id);

        match client.post(&endpoint).json(&reading).send().await {
            Ok(response) if response.status() == StatusCode::CREATED => {
                counter += 1;
            }
            Ok(response) => {
                failures += 1;
                warn!(
                    "Backend rejected reading for {}: {}",
                    reading.device_id,
                    response.status()
                );
            }
            Err(e) => {
                failures += 1;
                error!("Failed to send reading: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        // Log progress periodically
        if attempts % 100 == 0 {
            info!(
                "Attempted {} readings: {} sent, {} failed",
                attempts, counter, failures
            );
        }

        let elapsed = started.elapsed();
        if elapsed < pause {
            tokio::time::sleep(pause - elapsed).await;
        }
    }
}

fn generate_reading(rng: &mut impl Rng, device_id: String) -> Reading {
    let temperature = if rng.gen_bool(0.05) {
        rng.gen_range(-20.0..45.0) // 5% outliers
    } else {
        rng.gen_range(15.0..35.0) // Normal range
    };

    let humidity = if rng.gen_bool(0.05) {
        rng.gen_range(0.0..100.0) // 5% outliers
    } else {
        rng.gen_range(30.0..80.0) // Normal range
    };

    Reading {
        device_id,
        timestamp: Utc::now(),
        temperature,
        humidity,
    }
}

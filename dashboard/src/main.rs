use clap::{Parser, Subcommand};
use dashboard::engine::DEFAULT_HISTORY_LIMIT;
use dashboard::{
    ClientState, EngineConfig, HttpApiClient, NewReading, Reading, SyncEngine, TracingNotifier,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ONE_SHOT_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Parser)]
#[command(name = "dashboard", about = "Live view of device telemetry")]
struct Cli {
    /// Base URL of the telemetry backend
    #[arg(long, env = "API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the backend and print device cards whenever they change
    Watch {
        /// Only show this device
        #[arg(long, env = "DEVICE")]
        device: Option<String>,

        #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 5)]
        interval: u64,
    },
    /// Record a reading by hand
    Add {
        #[arg(long)]
        device_id: String,

        #[arg(long, allow_hyphen_values = true)]
        temperature: f64,

        #[arg(long)]
        humidity: f64,
    },
    /// Print the recent readings of one device
    History {
        device_id: String,

        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let client = match HttpApiClient::new(&cli.api_url) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    // One-shot commands never wait for a tick, so they never poll on their own.
    let config = match &cli.command {
        Command::Watch { interval, .. } => EngineConfig {
            poll_interval: Duration::from_secs((*interval).max(1)),
            ..EngineConfig::default()
        },
        _ => EngineConfig {
            poll_interval: ONE_SHOT_IDLE,
            first_poll_delay: ONE_SHOT_IDLE,
        },
    };
    let engine = SyncEngine::start(client, Arc::new(TracingNotifier), config);

    let code = match cli.command {
        Command::Watch { device, .. } => {
            watch(&engine, device).await;
            0
        }
        Command::Add {
            device_id,
            temperature,
            humidity,
        } => {
            let reading = NewReading {
                device_id,
                temperature,
                humidity,
            };
            match engine.add_data(reading).await {
                Ok(stored) => {
                    print_reading(&stored);
                    0
                }
                Err(_) => 1,
            }
        }
        Command::History { device_id, limit } => match engine.history(&device_id, limit).await {
            Ok(history) => {
                history.iter().for_each(print_reading);
                0
            }
            Err(_) => 1,
        },
    };

    engine.shutdown();
    std::process::exit(code);
}

async fn watch(engine: &SyncEngine, device: Option<String>) {
    let mut updates = engine.subscribe();
    if device.is_some() {
        engine.set_selected_device(device).await;
    }
    info!("Watching device telemetry, press Ctrl-C to stop");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                render(&state);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }
}

fn render(state: &ClientState) {
    if state.loading {
        return;
    }
    if let Some(error) = &state.error {
        println!("! {}", error);
    }
    if state.device_data.is_empty() {
        println!("(no device data)");
        return;
    }
    println!("--- {} device(s) ---", state.devices.len());
    state.device_data.iter().for_each(print_reading);
}

fn print_reading(reading: &Reading) {
    println!(
        "{:<16} {:>7.1} °C {:>6.1} %  {}",
        reading.device_id,
        reading.temperature,
        reading.humidity,
        reading.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
}

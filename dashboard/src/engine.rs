use crate::api::TelemetrySource;
use crate::errors::{Error, Result};
use crate::model::{NewReading, Reading};
use crate::notify::{Notification, Notifier};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const LOAD_ERROR_MESSAGE: &str = "Failed to load device data. Please try again later.";

/// Everything a view needs to render. Only the engine writes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    /// Device ids present in `device_data`, in first-seen order.
    pub devices: Vec<String>,
    pub device_data: Vec<Reading>,
    pub selected_device: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    /// Delay before the first poll. Zero polls as soon as the engine starts.
    pub first_poll_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            first_poll_delay: Duration::ZERO,
        }
    }
}

/// The filter every request is issued under. `generation` changes whenever
/// the device filter changes or the engine shuts down; a response is applied
/// only if the generation it was issued under is still current.
///
/// Within one generation every sync gets a ticket in issue order. A response
/// older than the last applied ticket is dropped, and `loading` stays set
/// while any ticket of the current generation is outstanding.
#[derive(Debug, Default)]
struct Scope {
    generation: u64,
    device: Option<String>,
    closed: bool,
    issued: u64,
    applied: u64,
    pending: BTreeSet<u64>,
}

struct Shared {
    source: Arc<dyn TelemetrySource>,
    notifier: Arc<dyn Notifier>,
    scope: Mutex<Scope>,
    state: watch::Sender<ClientState>,
}

/// Polls the backend and keeps [`ClientState`] in step with it.
///
/// The poll task starts in [`SyncEngine::start`] and runs until
/// [`SyncEngine::shutdown`] or drop.
pub struct SyncEngine {
    shared: Arc<Shared>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Spawns the poll task; the first poll fires after
    /// `config.first_poll_delay`. Must be called inside a tokio runtime.
    pub fn start(
        source: Arc<dyn TelemetrySource>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(ClientState::default());
        let shared = Arc::new(Shared {
            source,
            notifier,
            scope: Mutex::new(Scope::default()),
            state,
        });

        info!(
            "Starting sync engine, polling every {:?}",
            config.poll_interval
        );
        let poller = tokio::spawn(run_poller(shared.clone(), config));

        Self {
            shared,
            poller: Mutex::new(Some(poller)),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ClientState {
        self.shared.state.borrow().clone()
    }

    /// Receiver that is notified whenever the state actually changes.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.shared.state.subscribe()
    }

    /// Syncs now under the current scope, outside the regular interval.
    pub async fn refresh(&self) {
        self.shared.sync().await;
    }

    /// Switches the device filter and syncs under the new scope at once.
    /// Responses still in flight for the old scope are dropped on arrival.
    pub async fn set_selected_device(&self, device_id: Option<String>) {
        {
            let mut scope = self.shared.lock_scope();
            if scope.closed {
                return;
            }
            scope.generation += 1;
            scope.pending.clear();
            scope.device = device_id.clone();
            self.shared.state.send_if_modified(|state| {
                let changed = state.selected_device != device_id;
                state.selected_device = device_id;
                changed
            });
        }
        self.shared.sync().await;
    }

    /// Submits a reading and, on success, syncs so it shows up immediately.
    /// The error is returned so the caller can keep the input for a retry.
    pub async fn add_data(&self, reading: NewReading) -> Result<Reading> {
        if self.shared.lock_scope().closed {
            return Err(Error::ShutDown);
        }

        match self.shared.source.add_reading(&reading).await {
            Ok(stored) => {
                self.shared.notifier.notify(Notification::info(
                    "Data added",
                    format!(
                        "New data for device {} saved successfully",
                        reading.device_id
                    ),
                ));
                self.shared.sync().await;
                Ok(stored)
            }
            Err(e) => {
                warn!("Error adding device data: {}", e);
                self.shared.notifier.notify(Notification::destructive(
                    "Error adding data",
                    "Could not save device data to server",
                ));
                Err(e)
            }
        }
    }

    /// Recent readings of one device, newest first. Does not touch the state.
    pub async fn history(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>> {
        match self.shared.source.history(device_id, limit).await {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!("Error fetching device history: {}", e);
                self.shared.notifier.notify(Notification::destructive(
                    "Data retrieval failed",
                    "Could not fetch device history",
                ));
                Err(e)
            }
        }
    }

    /// Stops the poll task and drops every response still in flight.
    pub fn shutdown(&self) {
        {
            let mut scope = self.shared.lock_scope();
            if !scope.closed {
                scope.closed = true;
                scope.generation += 1;
                scope.pending.clear();
                info!("Sync engine stopped");
            }
        }
        if let Some(poller) = self
            .poller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            poller.abort();
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_poller(shared: Arc<Shared>, config: EngineConfig) {
    let mut ticker = interval_at(
        Instant::now() + config.first_poll_delay,
        config.poll_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        shared.sync().await;
    }
}

impl Shared {
    // A panic while holding the lock cannot leave `Scope` half-updated.
    fn lock_scope(&self) -> MutexGuard<'_, Scope> {
        self.scope
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn sync(&self) {
        let (generation, ticket, device) = {
            let mut scope = self.lock_scope();
            if scope.closed {
                return;
            }
            scope.issued += 1;
            let ticket = scope.issued;
            scope.pending.insert(ticket);
            self.state.send_if_modified(|state| {
                let changed = !state.loading;
                state.loading = true;
                changed
            });
            (scope.generation, ticket, scope.device.clone())
        };

        let result = match &device {
            None => self.source.latest_all().await,
            // A device without data has no card; that is not a failure.
            Some(device_id) => match self.source.latest(device_id).await {
                Err(e) if e.is_not_found() => Ok(Vec::new()),
                other => other,
            },
        };

        let failed = {
            let mut scope = self.lock_scope();
            if scope.closed || scope.generation != generation {
                debug!("Discarding response for stale scope {:?}", device);
                return;
            }
            scope.pending.remove(&ticket);
            let loading = !scope.pending.is_empty();

            if ticket < scope.applied {
                debug!(
                    "Discarding sync #{} overtaken by sync #{}",
                    ticket, scope.applied
                );
                self.state.send_if_modified(|state| {
                    let changed = state.loading != loading;
                    state.loading = loading;
                    changed
                });
                return;
            }
            scope.applied = ticket;

            match result {
                Ok(device_data) => {
                    let devices = distinct_devices(&device_data);
                    self.state.send_if_modified(|state| {
                        let changed = state.device_data != device_data
                            || state.devices != devices
                            || state.error.is_some()
                            || state.loading != loading;
                        state.device_data = device_data;
                        state.devices = devices;
                        state.error = None;
                        state.loading = loading;
                        changed
                    });
                    None
                }
                Err(e) => {
                    self.state.send_if_modified(|state| {
                        let changed = state.loading != loading
                            || state.error.as_deref() != Some(LOAD_ERROR_MESSAGE);
                        state.error = Some(LOAD_ERROR_MESSAGE.to_string());
                        state.loading = loading;
                        changed
                    });
                    Some(e)
                }
            }
        };

        if let Some(e) = failed {
            warn!("Error fetching device data: {}", e);
            self.notifier.notify(Notification::destructive(
                "Error fetching data",
                "Could not retrieve device data from server",
            ));
        }
    }
}

fn distinct_devices(readings: &[Reading]) -> Vec<String> {
    let mut devices: Vec<String> = Vec::new();
    for reading in readings {
        if !devices.contains(&reading.device_id) {
            devices.push(reading.device_id.clone());
        }
    }
    devices
}

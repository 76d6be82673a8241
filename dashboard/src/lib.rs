//! Client side of the telemetry dashboard.
//!
//! [`SyncEngine`] polls the backend, keeps the latest device snapshots in a
//! [`ClientState`] and hands read-only views of it to whoever renders them.

pub mod api;
pub mod engine;
pub mod errors;
pub mod model;
pub mod notify;

pub use api::{HttpApiClient, TelemetrySource};
pub use engine::{ClientState, EngineConfig, SyncEngine};
pub use errors::{Error, Result};
pub use model::{NewReading, Reading};
pub use notify::{Notification, Notifier, Severity, TracingNotifier};

use crate::errors::Result;
use crate::model::{Reading, ValidReading};
use async_trait::async_trait;

/// Append-only collection of readings.
///
/// Readings of one device are ordered by timestamp, ties broken by insertion
/// order. Implementations must honour that ordering in `latest` and `history`.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Appends a reading and returns it with its assigned identifier.
    async fn insert(&self, reading: ValidReading) -> Result<Reading>;

    /// Distinct device ids that have at least one reading.
    async fn device_ids(&self) -> Result<Vec<String>>;

    /// Most recent reading of a device.
    async fn latest(&self, device_id: &str) -> Result<Option<Reading>>;

    /// Up to `limit` most recent readings of a device, newest first.
    async fn history(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>>;

    /// Most recent reading of every device.
    ///
    /// The default issues one `latest` lookup per device id, which is fine
    /// for a handful of devices. Stores that can answer it in one grouped
    /// query should override it.
    async fn latest_per_device(&self) -> Result<Vec<Reading>> {
        let mut latest = Vec::new();
        for device_id in self.device_ids().await? {
            if let Some(reading) = self.latest(&device_id).await? {
                latest.push(reading);
            }
        }
        Ok(latest)
    }
}

//! In-process reading store, used with `STORE=memory` and in tests.

use crate::errors::{Error, Result};
use crate::model::{Reading, ValidReading};
use crate::store::ReadingStore;
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::sync::RwLock;
use uuid::Uuid;

/// Readings kept in insertion order; the vector index is the sequence number.
#[derive(Default)]
pub struct InMemoryReadingStore {
    rows: RwLock<Vec<Reading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    /// Readings of one device, newest first.
    fn newest_first(&self, device_id: &str) -> Result<Vec<Reading>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| Error::Store("lock poisoned".to_string()))?;
        let mut selected: Vec<(usize, &Reading)> = rows
            .iter()
            .enumerate()
            .filter(|(_, reading)| reading.device_id == device_id)
            .collect();
        selected.sort_by_key(|(seq, reading)| Reverse((reading.timestamp, *seq)));
        Ok(selected.into_iter().map(|(_, r)| r.clone()).collect())
    }
}

#[async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn insert(&self, reading: ValidReading) -> Result<Reading> {
        let reading = reading.into_reading(Uuid::new_v4());
        let mut rows = self
            .rows
            .write()
            .map_err(|_| Error::Store("lock poisoned".to_string()))?;
        rows.push(reading.clone());
        Ok(reading)
    }

    async fn device_ids(&self) -> Result<Vec<String>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| Error::Store("lock poisoned".to_string()))?;
        let ids: BTreeSet<&str> = rows.iter().map(|r| r.device_id.as_str()).collect();
        Ok(ids.into_iter().map(str::to_string).collect())
    }

    async fn latest(&self, device_id: &str) -> Result<Option<Reading>> {
        Ok(self.newest_first(device_id)?.into_iter().next())
    }

    async fn history(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>> {
        let mut readings = self.newest_first(device_id)?;
        readings.truncate(limit);
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn valid(device_id: &str, temperature: f64, offset_secs: i64) -> ValidReading {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        ValidReading {
            device_id: device_id.to_string(),
            temperature,
            humidity: 50.0,
            timestamp: base + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn latest_prefers_newest_timestamp_over_insert_order() {
        let store = InMemoryReadingStore::new();
        store.insert(valid("a", 2.0, 10)).await.unwrap();
        store.insert(valid("a", 1.0, 5)).await.unwrap();

        let latest = store.latest("a").await.unwrap().unwrap();
        assert_eq!(latest.temperature, 2.0);
    }

    #[tokio::test]
    async fn equal_timestamps_resolve_to_last_inserted() {
        let store = InMemoryReadingStore::new();
        store.insert(valid("a", 1.0, 0)).await.unwrap();
        store.insert(valid("a", 2.0, 0)).await.unwrap();
        store.insert(valid("a", 3.0, 0)).await.unwrap();

        let latest = store.latest("a").await.unwrap().unwrap();
        assert_eq!(latest.temperature, 3.0);

        let history = store.history("a", 10).await.unwrap();
        let temps: Vec<f64> = history.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![3.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn device_ids_are_distinct() {
        let store = InMemoryReadingStore::new();
        store.insert(valid("b", 1.0, 0)).await.unwrap();
        store.insert(valid("a", 1.0, 1)).await.unwrap();
        store.insert(valid("b", 1.0, 2)).await.unwrap();

        assert_eq!(store.device_ids().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn default_latest_per_device_returns_one_per_device() {
        let store = InMemoryReadingStore::new();
        store.insert(valid("a", 1.0, 0)).await.unwrap();
        store.insert(valid("a", 2.0, 1)).await.unwrap();
        store.insert(valid("b", 3.0, 0)).await.unwrap();

        let latest = store.latest_per_device().await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].device_id, "a");
        assert_eq!(latest[0].temperature, 2.0);
        assert_eq!(latest[1].device_id, "b");
    }
}

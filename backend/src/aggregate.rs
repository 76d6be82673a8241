use crate::errors::{Error, Result};
use crate::metrics::{DEVICES_REPORTING, QUERY_LATENCY_SECONDS};
use crate::model::Reading;
use crate::store::ReadingStore;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Read side of the API: latest snapshots and bounded history.
///
/// Nothing is cached; every call goes to the store. Store faults are passed
/// through untouched and no call is retried here.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn ReadingStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    /// Most recent reading of every device that ever reported.
    pub async fn latest_all(&self) -> Result<Vec<Reading>> {
        let _timer = QUERY_LATENCY_SECONDS.start_timer();
        let latest = self.store.latest_per_device().await?;
        DEVICES_REPORTING.set(latest.len() as f64);
        debug!("Latest snapshot covers {} devices", latest.len());
        Ok(latest)
    }

    pub async fn latest(&self, device_id: &str) -> Result<Reading> {
        let _timer = QUERY_LATENCY_SECONDS.start_timer();
        self.store
            .latest(device_id)
            .await?
            .ok_or_else(|| Error::NotFound("No data found for this device".to_string()))
    }

    /// Up to `limit` readings, newest first. A device without readings is
    /// reported as not found rather than as an empty history.
    pub async fn history(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>> {
        let _timer = QUERY_LATENCY_SECONDS.start_timer();
        let history = self.store.history(device_id, limit).await?;
        if history.is_empty() {
            return Err(Error::NotFound(
                "No history found for this device".to_string(),
            ));
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryReadingStore;
    use crate::model::ValidReading;
    use chrono::{Duration, TimeZone, Utc};

    async fn seeded(readings: &[(&str, f64, f64, i64)]) -> Aggregator {
        let store = InMemoryReadingStore::new();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for (device_id, temperature, humidity, offset) in readings {
            store
                .insert(ValidReading {
                    device_id: device_id.to_string(),
                    temperature: *temperature,
                    humidity: *humidity,
                    timestamp: base + Duration::seconds(*offset),
                })
                .await
                .unwrap();
        }
        Aggregator::new(Arc::new(store))
    }

    #[tokio::test]
    async fn latest_all_picks_newest_per_device() {
        let aggregator = seeded(&[
            ("A", 25.0, 50.0, 0),
            ("A", 26.0, 52.0, 1),
            ("B", 18.0, 40.0, 2),
        ])
        .await;

        let mut latest = aggregator.latest_all().await.unwrap();
        latest.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].device_id, "A");
        assert_eq!((latest[0].temperature, latest[0].humidity), (26.0, 52.0));
        assert_eq!(latest[1].device_id, "B");
        assert_eq!((latest[1].temperature, latest[1].humidity), (18.0, 40.0));
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let aggregator = seeded(&[
            ("A", 25.0, 50.0, 0),
            ("A", 26.0, 52.0, 1),
            ("B", 18.0, 40.0, 2),
        ])
        .await;

        let history = aggregator
            .history("A", DEFAULT_HISTORY_LIMIT)
            .await
            .unwrap();
        let values: Vec<(f64, f64)> = history
            .iter()
            .map(|r| (r.temperature, r.humidity))
            .collect();

        assert_eq!(values, vec![(26.0, 52.0), (25.0, 50.0)]);
    }

    #[tokio::test]
    async fn history_limit_is_prefix_of_larger_limit() {
        let aggregator = seeded(&[
            ("A", 1.0, 10.0, 0),
            ("A", 2.0, 10.0, 1),
            ("A", 3.0, 10.0, 2),
            ("A", 4.0, 10.0, 3),
            ("A", 5.0, 10.0, 4),
        ])
        .await;

        let two = aggregator.history("A", 2).await.unwrap();
        let five = aggregator.history("A", 5).await.unwrap();

        assert_eq!(two.len(), 2);
        assert_eq!(two[0].temperature, 5.0);
        assert_eq!(two[1].temperature, 4.0);
        assert_eq!(&five[..2], &two[..]);
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let aggregator = seeded(&[("A", 1.0, 10.0, 0)]).await;

        assert!(matches!(
            aggregator.latest("unknown-device").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            aggregator.history("unknown-device", 20).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn latest_all_on_empty_store_is_empty() {
        let aggregator = seeded(&[]).await;

        assert!(aggregator.latest_all().await.unwrap().is_empty());
    }
}

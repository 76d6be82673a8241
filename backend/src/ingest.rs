use crate::errors::Result;
use crate::metrics::{READINGS_INGESTED_TOTAL, READINGS_REJECTED_TOTAL};
use crate::model::{NewReading, Reading};
use crate::store::ReadingStore;
use crate::validate::validate;
use chrono::Utc;
use tracing::{debug, warn};

/// Validates and stores one reading.
///
/// There is no idempotency key: a retried submission is stored as a second
/// reading.
pub async fn append(store: &dyn ReadingStore, request: NewReading) -> Result<Reading> {
    let reading = match validate(request, Utc::now()) {
        Ok(reading) => reading,
        Err(e) => {
            READINGS_REJECTED_TOTAL.inc();
            warn!("Rejected reading: {}", e);
            return Err(e);
        }
    };

    let stored = store.insert(reading).await?;
    READINGS_INGESTED_TOTAL.inc();
    debug!(
        "Stored reading {} for device {}",
        stored.id, stored.device_id
    );

    Ok(stored)
}

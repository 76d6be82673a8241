use crate::errors::{Error, Result};
use crate::model::{NewReading, ValidReading};
use chrono::{DateTime, Utc};

const MISSING_FIELDS: &str =
    "Missing required fields: deviceId, temperature, and humidity are required";

/// Validates an ingestion request.
///
/// Presence is checked explicitly, so `0.0` is a valid temperature or
/// humidity. `received_at` becomes the timestamp when the caller sent none.
pub fn validate(reading: NewReading, received_at: DateTime<Utc>) -> Result<ValidReading> {
    let device_id = reading
        .device_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Validation(MISSING_FIELDS.to_string()))?;

    let (Some(temperature), Some(humidity)) = (reading.temperature, reading.humidity) else {
        return Err(Error::Validation(MISSING_FIELDS.to_string()));
    };

    if !temperature.is_finite() {
        return Err(Error::Validation(format!(
            "Temperature {} is not a finite number",
            temperature
        )));
    }

    if !humidity.is_finite() {
        return Err(Error::Validation(format!(
            "Humidity {} is not a finite number",
            humidity
        )));
    }

    Ok(ValidReading {
        device_id: device_id.to_string(),
        temperature,
        humidity,
        timestamp: reading.timestamp.unwrap_or(received_at),
    })
}

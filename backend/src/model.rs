use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored telemetry sample. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Ingestion request body. Every field is optional here so that missing
/// values can be reported as validation errors instead of decode failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReading {
    pub device_id: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A reading that passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReading {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}

impl ValidReading {
    pub fn into_reading(self, id: Uuid) -> Reading {
        Reading {
            id,
            device_id: self.device_id,
            temperature: self.temperature,
            humidity: self.humidity,
            timestamp: self.timestamp,
        }
    }
}

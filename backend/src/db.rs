use crate::errors::Result;
use crate::metrics::STORE_FAILURES_TOTAL;
use crate::model::{Reading, ValidReading};
use crate::store::ReadingStore;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const READING_COLUMNS: &str = "id, device_id, temperature, humidity, ts AS timestamp";

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed reading store.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert(&self, reading: ValidReading) -> Result<Reading> {
        let query = format!(
            "INSERT INTO readings (id, device_id, temperature, humidity, ts)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            READING_COLUMNS
        );

        sqlx::query_as::<_, Reading>(&query)
            .bind(Uuid::new_v4())
            .bind(&reading.device_id)
            .bind(reading.temperature)
            .bind(reading.humidity)
            .bind(reading.timestamp)
            .fetch_one(&self.pool)
            .await
            .map_err(record_failure)
    }

    async fn device_ids(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT DISTINCT device_id FROM readings ORDER BY device_id")
            .fetch_all(&self.pool)
            .await
            .map_err(record_failure)
    }

    async fn latest(&self, device_id: &str) -> Result<Option<Reading>> {
        let query = format!(
            "SELECT {} FROM readings
             WHERE device_id = $1
             ORDER BY ts DESC, seq DESC
             LIMIT 1",
            READING_COLUMNS
        );

        sqlx::query_as::<_, Reading>(&query)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(record_failure)
    }

    async fn history(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>> {
        let query = format!(
            "SELECT {} FROM readings
             WHERE device_id = $1
             ORDER BY ts DESC, seq DESC
             LIMIT $2",
            READING_COLUMNS
        );

        sqlx::query_as::<_, Reading>(&query)
            .bind(device_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(record_failure)
    }

    // One pass over the (device_id, ts, seq) index instead of a lookup per device.
    async fn latest_per_device(&self) -> Result<Vec<Reading>> {
        let query = format!(
            "SELECT DISTINCT ON (device_id) {} FROM readings
             ORDER BY device_id, ts DESC, seq DESC",
            READING_COLUMNS
        );

        sqlx::query_as::<_, Reading>(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(record_failure)
    }
}

fn record_failure(err: sqlx::Error) -> crate::errors::Error {
    STORE_FAILURES_TOTAL.inc();
    if is_transient_error(&err) {
        warn!("Transient database failure: {}", err);
    } else {
        error!("Database query failed: {}", err);
    }
    err.into()
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Check if it's a connection-related error
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}

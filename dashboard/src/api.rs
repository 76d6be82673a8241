use crate::errors::{Error, Result};
use crate::model::{NewReading, Reading};
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the sync engine gets its data from.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Latest reading of every device.
    async fn latest_all(&self) -> Result<Vec<Reading>>;

    /// Latest reading of one device, as a one-element sequence.
    async fn latest(&self, device_id: &str) -> Result<Vec<Reading>>;

    /// Up to `limit` recent readings of one device, newest first.
    async fn history(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>>;

    async fn add_reading(&self, reading: &NewReading) -> Result<Reading>;
}

/// `TelemetrySource` backed by the `/api/data` HTTP API.
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("{} cannot be a base URL", base_url)));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self { client, base_url })
    }

    /// Joins path segments under `/api/data`, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "data"]).extend(segments);
        }
        url
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.message,
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            };
            return Err(Error::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TelemetrySource for HttpApiClient {
    async fn latest_all(&self) -> Result<Vec<Reading>> {
        let url = self.endpoint(&["latest"]);
        debug!("GET {}", url);
        Self::read(self.client.get(url).send().await?).await
    }

    async fn latest(&self, device_id: &str) -> Result<Vec<Reading>> {
        let url = self.endpoint(&["latest", device_id]);
        debug!("GET {}", url);
        Self::read(self.client.get(url).send().await?).await
    }

    async fn history(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>> {
        let url = self.endpoint(&["history", device_id]);
        debug!("GET {} limit={}", url, limit);
        let response = self
            .client
            .get(url)
            .query(&[("limit", limit)])
            .send()
            .await?;
        Self::read(response).await
    }

    async fn add_reading(&self, reading: &NewReading) -> Result<Reading> {
        let url = self.endpoint(&[]);
        debug!("POST {}", url);
        Self::read(self.client.post(url).json(reading).send().await?).await
    }
}

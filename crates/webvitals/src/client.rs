use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use webvitals_protocol::*;

/// Environment variable holding the query server's base URL
pub const URL_ENV: &str = "WEBVITALS_URL";

pub const DEFAULT_URL: &str = "http://localhost:1990";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Query service reached over the server's HTTP API
#[derive(Clone, Debug)]
pub struct VitalsClient {
    base_url: String,
    http: Client,
}

impl VitalsClient {
    /// Client for the server at `base_url` (`http://` or `https://`)
    ///
    /// # Example
    /// ```no_run
    /// # use webvitals::{VitalsClient, VitalsQueryService};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = VitalsClient::new("http://localhost:1990")?;
    /// let percentiles = client.project_percentiles(Some("/checkout".into())).await?;
    /// println!("p75 lcp: {:?}", percentiles.p75.lcp);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        let base_url = base_url.as_ref().trim().trim_end_matches('/');
        let has_host = base_url
            .strip_prefix("http://")
            .or_else(|| base_url.strip_prefix("https://"))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }

    /// Client for `$WEBVITALS_URL`, or the local default server
    pub fn from_env() -> Result<Self, ClientError> {
        let url = std::env::var(URL_ENV).unwrap_or_else(|_| DEFAULT_URL.to_string());
        Self::new(url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T, Q>(&self, path: &str, params: &Q) -> Result<T, QueryError>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        tracing::debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .query(params)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

fn transport_error(err: reqwest::Error) -> QueryError {
    QueryError::Transport(err.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, QueryError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| QueryError::Decode(e.to_string()));
    }

    let text = response.text().await.map_err(transport_error)?;
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.error,
        Err(_) => text,
    };

    if status == StatusCode::BAD_REQUEST {
        let message = message
            .strip_prefix("invalid search query: ")
            .map(str::to_string)
            .unwrap_or(message);
        return Err(QueryError::InvalidQuery(message));
    }

    tracing::warn!(status = status.as_u16(), "query server error: {}", message);
    Err(QueryError::Server {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl VitalsQueryService for VitalsClient {
    async fn ingest(&self, events: Vec<TransactionEvent>) -> Result<u32, QueryError> {
        let response = self
            .http
            .post(self.url(routes::EVENTS))
            .json(&events)
            .send()
            .await
            .map_err(transport_error)?;
        let body: IngestResponse = decode(response).await?;
        Ok(body.ingested)
    }

    async fn project_percentiles(
        &self,
        transaction: Option<String>,
    ) -> Result<ProjectVitalPercentiles, QueryError> {
        self.get(routes::PERCENTILES, &TransactionParams { transaction })
            .await
    }

    async fn vital_timeseries(
        &self,
        transaction: Option<String>,
    ) -> Result<VitalTimeseries, QueryError> {
        self.get(routes::TIMESERIES, &TransactionParams { transaction })
            .await
    }

    async fn transaction_samples(
        &self,
        query: SampleQuery,
    ) -> Result<Vec<TransactionSample>, QueryError> {
        self.get(routes::SAMPLES, &SampleParams::from(&query)).await
    }

    async fn ping(&self) -> Result<String, QueryError> {
        let response = self
            .http
            .get(self.url(routes::PING))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return decode(response).await;
        }
        response.text().await.map_err(transport_error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base url {0:?}: expected http:// or https://")]
    InvalidBaseUrl(String),

    #[error("failed to build http client: {0}")]
    Build(String),
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sample::{ProjectVitalPercentiles, TransactionEvent, TransactionSample, VitalTimeseries};
use crate::search::{SearchQuery, SearchQueryError};

/// Parameters of a sampled-transactions query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleQuery {
    /// Only events for this transaction name
    pub transaction: Option<String>,
    /// Threshold filter over measurements
    pub query: Option<SearchQuery>,
    /// Maximum number of rows returned
    pub limit: usize,
    /// Prefer events that carry a profile and include profile ids in the rows
    pub with_profiles: bool,
}

/// The query layer: aggregate percentiles, per-vital time series, and
/// sampled events.
///
/// Implemented in-process by the server's store and over HTTP by the client.
#[async_trait]
pub trait VitalsQueryService: Send + Sync {
    /// Store transaction events, returning how many were accepted
    async fn ingest(&self, events: Vec<TransactionEvent>) -> Result<u32, QueryError>;

    /// p75 of every vital, optionally scoped to one transaction
    async fn project_percentiles(
        &self,
        transaction: Option<String>,
    ) -> Result<ProjectVitalPercentiles, QueryError>;

    /// p75 of every vital over time, optionally scoped to one transaction
    async fn vital_timeseries(
        &self,
        transaction: Option<String>,
    ) -> Result<VitalTimeseries, QueryError>;

    /// Individual events matching a threshold filter
    async fn transaction_samples(
        &self,
        query: SampleQuery,
    ) -> Result<Vec<TransactionSample>, QueryError>;

    async fn ping(&self) -> Result<String, QueryError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// HTTP paths served by the query server
pub mod routes {
    pub const PING: &str = "/api/ping";
    pub const EVENTS: &str = "/api/events";
    pub const PERCENTILES: &str = "/api/percentiles";
    pub const TIMESERIES: &str = "/api/timeseries";
    pub const SAMPLES: &str = "/api/samples";
}

/// Query string of the percentile and timeseries endpoints
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionParams {
    pub transaction: Option<String>,
}

impl TransactionParams {
    /// The transaction filter, with an empty name meaning "all transactions"
    pub fn into_filter(self) -> Option<String> {
        self.transaction.filter(|t| !t.is_empty())
    }
}

/// Query string of the samples endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleParams {
    pub transaction: Option<String>,
    pub query: Option<String>,
    pub limit: Option<usize>,
    pub with_profiles: Option<bool>,
}

impl SampleParams {
    /// Limit applied when the caller doesn't give one
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn into_query(self) -> Result<SampleQuery, SearchQueryError> {
        let query = match self.query.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(SearchQuery::parse(text)?),
            _ => None,
        };

        Ok(SampleQuery {
            transaction: self.transaction.filter(|t| !t.is_empty()),
            query,
            limit: self.limit.unwrap_or(Self::DEFAULT_LIMIT),
            with_profiles: self.with_profiles.unwrap_or(false),
        })
    }
}

impl From<&SampleQuery> for SampleParams {
    fn from(query: &SampleQuery) -> Self {
        Self {
            transaction: query.transaction.clone(),
            query: query.query.as_ref().map(SearchQuery::to_string),
            limit: Some(query.limit),
            with_profiles: Some(query.with_profiles),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ingested: u32,
}

/// Body of every non-2xx response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_params_round_trip() {
        let query = SampleQuery {
            transaction: Some("/checkout".to_string()),
            query: Some(SearchQuery::parse("measurements.lcp:>=2400").unwrap()),
            limit: 3,
            with_profiles: true,
        };
        let params = SampleParams::from(&query);
        assert_eq!(params.query.as_deref(), Some("measurements.lcp:>=2400"));
        assert_eq!(params.into_query().unwrap(), query);
    }

    #[test]
    fn sample_params_defaults() {
        let query = SampleParams {
            transaction: Some(String::new()),
            query: Some("  ".to_string()),
            ..Default::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(query.transaction, None);
        assert_eq!(query.query, None);
        assert_eq!(query.limit, SampleParams::DEFAULT_LIMIT);
        assert!(!query.with_profiles);
    }

    #[test]
    fn sample_params_reject_bad_query() {
        let err = SampleParams {
            query: Some("measurements.lcp:<soon".to_string()),
            ..Default::default()
        }
        .into_query()
        .unwrap_err();
        assert!(matches!(err, SearchQueryError::InvalidNumber(_)));
    }
}

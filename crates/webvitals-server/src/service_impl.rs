use async_trait::async_trait;
use std::sync::Arc;
use webvitals_protocol::*;

use crate::storage::SampleStore;

#[derive(Clone)]
pub struct VitalsServiceImpl {
    store: Arc<SampleStore>,
}

impl VitalsServiceImpl {
    pub fn new(store: Arc<SampleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SampleStore> {
        &self.store
    }
}

#[async_trait]
impl VitalsQueryService for VitalsServiceImpl {
    async fn ingest(&self, events: Vec<TransactionEvent>) -> Result<u32, QueryError> {
        // Only page loads that recorded at least one vital are worth keeping
        let received = events.len();
        let events: Vec<_> = events
            .into_iter()
            .filter(|event| event.sample.measurements.iter().any(|(_, v)| v.is_some()))
            .collect();

        if events.len() < received {
            tracing::debug!(
                dropped = received - events.len(),
                "dropped events without web vital measurements"
            );
        }

        Ok(self.store.ingest(events))
    }

    async fn project_percentiles(
        &self,
        transaction: Option<String>,
    ) -> Result<ProjectVitalPercentiles, QueryError> {
        Ok(self.store.project_percentiles(transaction.as_deref()))
    }

    async fn vital_timeseries(
        &self,
        transaction: Option<String>,
    ) -> Result<VitalTimeseries, QueryError> {
        Ok(self.store.vital_timeseries(transaction.as_deref()))
    }

    async fn transaction_samples(
        &self,
        query: SampleQuery,
    ) -> Result<Vec<TransactionSample>, QueryError> {
        Ok(self.store.transaction_samples(&query))
    }

    async fn ping(&self) -> Result<String, QueryError> {
        Ok("pong".to_string())
    }
}

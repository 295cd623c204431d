//! In-memory query service for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use webvitals_protocol::*;

pub(crate) fn sample(n: u8, lcp: Option<f64>) -> TransactionSample {
    TransactionSample {
        id: EventId([n; 16]),
        replay_id: Some(ReplayId([n.wrapping_add(100); 16])),
        profile_id: Some(ProfileId([n.wrapping_add(200); 16])),
        transaction: "/checkout".to_string(),
        project_slug: "storefront".to_string(),
        timestamp: Timestamp::from_secs(1_700_000_000 + u64::from(n)),
        measurements: Measurements {
            lcp,
            ..Default::default()
        },
        duration_ms: Some(1500.0),
    }
}

/// Answers from a fixed sample list. While gated, every call blocks until
/// [`FakeService::release`].
pub(crate) struct FakeService {
    samples: Mutex<Vec<TransactionSample>>,
    sample_queries: Mutex<Vec<SampleQuery>>,
    percentiles: Mutex<Measurements>,
    percentile_calls: AtomicUsize,
    timeseries_calls: AtomicUsize,
    panic_on_percentiles: AtomicBool,
    gate: Semaphore,
}

impl Default for FakeService {
    fn default() -> Self {
        let gate = Semaphore::new(0);
        gate.close();
        Self::with_gate(gate)
    }
}

impl FakeService {
    pub(crate) fn gated() -> Self {
        Self::with_gate(Semaphore::new(0))
    }

    fn with_gate(gate: Semaphore) -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
            sample_queries: Mutex::new(Vec::new()),
            percentiles: Mutex::new(Measurements::default()),
            percentile_calls: AtomicUsize::new(0),
            timeseries_calls: AtomicUsize::new(0),
            panic_on_percentiles: AtomicBool::new(false),
            gate,
        }
    }

    /// Let every blocked and future call through
    pub(crate) fn release(&self) {
        self.gate.close();
    }

    /// Make every percentiles call panic
    pub(crate) fn panic_on_percentiles(&self) {
        self.panic_on_percentiles.store(true, Ordering::SeqCst);
    }

    pub(crate) fn insert_samples(&self, samples: impl IntoIterator<Item = TransactionSample>) {
        self.samples.lock().extend(samples);
    }

    pub(crate) fn set_percentiles(&self, p75: Measurements) {
        *self.percentiles.lock() = p75;
    }

    pub(crate) fn sample_queries(&self) -> Vec<SampleQuery> {
        self.sample_queries.lock().clone()
    }

    pub(crate) fn percentile_calls(&self) -> usize {
        self.percentile_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn timeseries_calls(&self) -> usize {
        self.timeseries_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        // Acquire only fails once the gate is closed, which means "open"
        let _ = self.gate.acquire().await;
    }
}

#[async_trait]
impl VitalsQueryService for FakeService {
    async fn ingest(&self, events: Vec<TransactionEvent>) -> Result<u32, QueryError> {
        let n = events.len() as u32;
        self.insert_samples(events.into_iter().map(|e| e.sample));
        Ok(n)
    }

    async fn project_percentiles(
        &self,
        transaction: Option<String>,
    ) -> Result<ProjectVitalPercentiles, QueryError> {
        self.percentile_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_percentiles.load(Ordering::SeqCst) {
            panic!("percentiles backend blew up");
        }
        self.wait().await;
        Ok(ProjectVitalPercentiles {
            transaction,
            p75: *self.percentiles.lock(),
            count: self.samples.lock().len() as u64,
        })
    }

    async fn vital_timeseries(
        &self,
        transaction: Option<String>,
    ) -> Result<VitalTimeseries, QueryError> {
        self.timeseries_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let samples = self.samples.lock();
        let series = VitalValues::from_fn(|vital| {
            samples
                .iter()
                .filter(|s| transaction.as_deref().map_or(true, |t| s.transaction == t))
                .map(|s| SeriesPoint {
                    name: s.timestamp.to_rfc3339(),
                    value: s.measurement(vital),
                })
                .collect()
        });
        Ok(VitalTimeseries {
            interval_secs: 3600,
            series,
        })
    }

    async fn transaction_samples(
        &self,
        query: SampleQuery,
    ) -> Result<Vec<TransactionSample>, QueryError> {
        self.sample_queries.lock().push(query.clone());
        self.wait().await;
        let samples = self.samples.lock();
        Ok(samples
            .iter()
            .filter(|s| {
                query
                    .transaction
                    .as_deref()
                    .map_or(true, |t| s.transaction == t)
            })
            .filter(|s| {
                query
                    .query
                    .as_ref()
                    .map_or(true, |q| q.matches(&s.measurements))
            })
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<String, QueryError> {
        Ok("pong".to_string())
    }
}

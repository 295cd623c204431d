//! The Web Vitals detail panel.
//!
//! The panel is either closed or open on one vital. Opening (or switching
//! vital, or changing the transaction filter while open) issues a fresh
//! request: five concurrent fetches tagged with a new sequence id. Results
//! carrying any other sequence id are stale and dropped on arrival.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use webvitals_protocol::*;

use crate::classify::{MergedSamples, SampleBucket, SampleBuckets, DETAIL_PANEL_SAMPLE_LIMIT};
use crate::score::ScoringProfile;
use crate::view::{self, PanelView, ViewContext};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanelState {
    #[default]
    Closed,
    Open(WebVital),
}

/// The parameters every fetch of one request is keyed by
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub vital: WebVital,
    pub transaction: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelRequest {
    pub seq: u64,
    pub key: RequestKey,
}

/// Which of the five fetches a result belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchKind {
    Percentiles,
    Timeseries,
    Bucket(SampleBucket),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelUpdate {
    /// A result for the current request was stored
    Applied(FetchKind),
    /// A result for a superseded request was dropped
    Discarded(FetchKind),
    /// Nothing is in flight
    Idle,
}

/// Result slot of a single fetch
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Fetch<T> {
    #[default]
    Idle,
    Pending,
    Ready(T),
    Failed(QueryError),
}

impl<T> Fetch<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Fetch::Pending)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Fetch::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            Fetch::Failed(err) => Some(err),
            _ => None,
        }
    }

    fn from_result(result: Result<T, QueryError>) -> Self {
        match result {
            Ok(value) => Fetch::Ready(value),
            Err(err) => Fetch::Failed(err),
        }
    }
}

enum FetchResult {
    Percentiles(Result<ProjectVitalPercentiles, QueryError>),
    Timeseries(Result<VitalTimeseries, QueryError>),
    Bucket(SampleBucket, Result<Vec<TransactionSample>, QueryError>),
}

impl FetchResult {
    fn failed(kind: FetchKind, err: QueryError) -> Self {
        match kind {
            FetchKind::Percentiles => FetchResult::Percentiles(Err(err)),
            FetchKind::Timeseries => FetchResult::Timeseries(Err(err)),
            FetchKind::Bucket(bucket) => FetchResult::Bucket(bucket, Err(err)),
        }
    }

    fn kind(&self) -> FetchKind {
        match self {
            FetchResult::Percentiles(_) => FetchKind::Percentiles,
            FetchResult::Timeseries(_) => FetchKind::Timeseries,
            FetchResult::Bucket(bucket, _) => FetchKind::Bucket(*bucket),
        }
    }
}

/// Detail panel driven by a query service.
///
/// Fetches run as tokio tasks, so [`open`](Self::open) and
/// [`set_transaction`](Self::set_transaction) must be called from within a
/// runtime.
pub struct DetailPanel<S: VitalsQueryService + ?Sized + 'static> {
    service: Arc<S>,
    profile: ScoringProfile,
    limit: usize,
    transaction: Option<String>,
    state: PanelState,
    request: Option<PanelRequest>,
    next_seq: u64,

    percentiles: Fetch<ProjectVitalPercentiles>,
    timeseries: Fetch<VitalTimeseries>,
    buckets: SampleBuckets,

    tx: mpsc::UnboundedSender<(u64, FetchResult)>,
    rx: mpsc::UnboundedReceiver<(u64, FetchResult)>,
    tasks: Vec<AbortHandle>,
    /// Results of the current request not yet received
    outstanding: usize,
}

impl<S: VitalsQueryService + ?Sized + 'static> DetailPanel<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self::with_profile(service, ScoringProfile::default())
    }

    pub fn with_profile(service: Arc<S>, profile: ScoringProfile) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            service,
            profile,
            limit: DETAIL_PANEL_SAMPLE_LIMIT,
            transaction: None,
            state: PanelState::Closed,
            request: None,
            next_seq: 0,
            percentiles: Fetch::Idle,
            timeseries: Fetch::Idle,
            buckets: SampleBuckets::new(None, DETAIL_PANEL_SAMPLE_LIMIT),
            tx,
            rx,
            tasks: Vec::new(),
            outstanding: 0,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn vital(&self) -> Option<WebVital> {
        match self.state {
            PanelState::Open(vital) => Some(vital),
            PanelState::Closed => None,
        }
    }

    pub fn transaction(&self) -> Option<&str> {
        self.transaction.as_deref()
    }

    pub fn profile(&self) -> &ScoringProfile {
        &self.profile
    }

    /// The request results are currently accepted for
    pub fn request(&self) -> Option<&PanelRequest> {
        self.request.as_ref()
    }

    pub fn percentiles(&self) -> &Fetch<ProjectVitalPercentiles> {
        &self.percentiles
    }

    pub fn timeseries(&self) -> &Fetch<VitalTimeseries> {
        &self.timeseries
    }

    pub fn buckets(&self) -> &SampleBuckets {
        &self.buckets
    }

    pub fn samples(&self) -> MergedSamples {
        self.buckets.merged(&self.profile)
    }

    pub fn is_loading(&self) -> bool {
        self.percentiles.is_pending() || self.timeseries.is_pending() || self.buckets.is_loading()
    }

    /// Open on `vital`. Always a fresh open: everything is re-fetched, even
    /// if the panel is already open on the same vital.
    pub fn open(&mut self, vital: WebVital) {
        self.state = PanelState::Open(vital);
        self.issue(vital);
    }

    pub fn close(&mut self) {
        self.cancel();
        self.state = PanelState::Closed;
        self.request = None;
        self.percentiles = Fetch::Idle;
        self.timeseries = Fetch::Idle;
        self.buckets = SampleBuckets::new(None, self.limit);
        tracing::debug!("detail panel closed");
    }

    /// Change the transaction filter, re-fetching if open
    pub fn set_transaction(&mut self, transaction: Option<String>) {
        self.transaction = transaction.filter(|t| !t.is_empty());
        if let PanelState::Open(vital) = self.state {
            self.issue(vital);
        }
    }

    /// Wait for the next fetch to complete and store it if it belongs to
    /// the current request
    pub async fn next_update(&mut self) -> PanelUpdate {
        if self.outstanding == 0 {
            return PanelUpdate::Idle;
        }

        let Some((seq, result)) = self.rx.recv().await else {
            return PanelUpdate::Idle;
        };
        let kind = result.kind();

        if self.request.as_ref().map(|r| r.seq) != Some(seq) {
            tracing::debug!(seq, ?kind, "discarding stale detail panel response");
            return PanelUpdate::Discarded(kind);
        }

        self.outstanding = self.outstanding.saturating_sub(1);
        self.apply(result);
        PanelUpdate::Applied(kind)
    }

    /// Drive [`next_update`](Self::next_update) until nothing is in flight
    pub async fn settle(&mut self) -> Vec<PanelUpdate> {
        let mut updates = Vec::new();
        loop {
            match self.next_update().await {
                PanelUpdate::Idle => return updates,
                update => updates.push(update),
            }
        }
    }

    pub fn snapshot(&self, ctx: &ViewContext<'_>) -> PanelView {
        let vital = self.vital();
        let merged = self.samples();

        let errors = self
            .percentiles
            .error()
            .into_iter()
            .chain(self.timeseries.error())
            .chain(merged.errors.iter())
            .map(ToString::to_string)
            .collect();

        PanelView {
            vital,
            header: view::detail_header(vital, self.percentiles.ready(), &self.profile),
            series: view::line_series(vital, self.timeseries.ready()),
            table: view::sample_table(ctx, vital, &merged),
            errors,
        }
    }

    fn issue(&mut self, vital: WebVital) {
        self.cancel();

        self.next_seq += 1;
        let seq = self.next_seq;
        let key = RequestKey {
            vital,
            transaction: self.transaction.clone(),
        };
        tracing::debug!(seq, %vital, transaction = ?key.transaction, "issuing detail panel request");

        self.request = Some(PanelRequest { seq, key });
        self.percentiles = Fetch::Pending;
        self.timeseries = Fetch::Pending;
        self.buckets = SampleBuckets::new(Some(vital), self.limit);

        let transaction = self.transaction.clone();
        self.spawn_fetch(seq, FetchKind::Percentiles, move |service| async move {
            FetchResult::Percentiles(service.project_percentiles(transaction).await)
        });

        let transaction = self.transaction.clone();
        self.spawn_fetch(seq, FetchKind::Timeseries, move |service| async move {
            FetchResult::Timeseries(service.vital_timeseries(transaction).await)
        });

        for bucket in SampleBucket::ALL {
            let query =
                bucket.sample_query(vital, self.transaction.clone(), self.limit, &self.profile);
            self.spawn_fetch(seq, FetchKind::Bucket(bucket), move |service| async move {
                FetchResult::Bucket(bucket, service.transaction_samples(query).await)
            });
        }
    }

    /// Run `fetch` on its own task. A fetch that panics still reports a
    /// failed result for `kind`, so the request always settles.
    fn spawn_fetch<F, Fut>(&mut self, seq: u64, kind: FetchKind, fetch: F)
    where
        F: FnOnce(Arc<S>) -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let fetch = tokio::spawn(fetch(Arc::clone(&self.service)));
        self.tasks.push(fetch.abort_handle());

        let tx = self.tx.clone();
        let relay = tokio::spawn(async move {
            let result = match fetch.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => return,
                Err(err) => {
                    tracing::error!(seq, ?kind, "detail panel fetch task failed: {}", err);
                    FetchResult::failed(
                        kind,
                        QueryError::Transport(format!("fetch task failed: {}", err)),
                    )
                }
            };
            // The receiver lives as long as the panel
            let _ = tx.send((seq, result));
        });
        self.tasks.push(relay.abort_handle());
        self.outstanding += 1;
    }

    fn cancel(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outstanding = 0;
    }

    fn apply(&mut self, result: FetchResult) {
        match result {
            FetchResult::Percentiles(result) => {
                if let Err(err) = &result {
                    tracing::warn!("percentiles query failed: {}", err);
                }
                self.percentiles = Fetch::from_result(result);
            }
            FetchResult::Timeseries(result) => {
                if let Err(err) = &result {
                    tracing::warn!("timeseries query failed: {}", err);
                }
                self.timeseries = Fetch::from_result(result);
            }
            FetchResult::Bucket(bucket, result) => {
                self.buckets.resolve(bucket, result);
            }
        }
    }
}

impl<S: VitalsQueryService + ?Sized + 'static> Drop for DetailPanel<S> {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample, FakeService};
    use crate::view::PathRoutes;
    use std::time::Duration;

    async fn run_spawned() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn seeded_service() -> Arc<FakeService> {
        let service = FakeService::default();
        service.insert_samples([
            sample(1, Some(500.0)),
            sample(2, Some(1800.0)),
            sample(3, Some(5000.0)),
            sample(4, None),
        ]);
        service.set_percentiles(Measurements {
            lcp: Some(1800.0),
            fcp: Some(700.0),
            ..Default::default()
        });
        Arc::new(service)
    }

    #[tokio::test]
    async fn open_fetches_everything() {
        let service = seeded_service();
        let mut panel = DetailPanel::new(Arc::clone(&service));
        assert_eq!(panel.state(), PanelState::Closed);
        assert_eq!(panel.next_update().await, PanelUpdate::Idle);

        panel.open(WebVital::Lcp);
        assert!(panel.is_loading());
        assert!(panel.samples().is_loading);

        let updates = panel.settle().await;
        assert_eq!(updates.len(), 5);
        assert!(updates.iter().all(|u| matches!(u, PanelUpdate::Applied(_))));
        assert!(!panel.is_loading());
        assert_eq!(service.percentile_calls(), 1);
        assert_eq!(service.timeseries_calls(), 1);
        assert_eq!(service.sample_queries().len(), 3);

        let routes = PathRoutes::new("acme");
        let view = panel.snapshot(&ViewContext::new(&routes));
        assert_eq!(view.vital, Some(WebVital::Lcp));
        assert_eq!(view.header.as_ref().map(|h| h.value.as_str()), Some("1.80s"));
        assert_eq!(view.series.series_name, "lcp");
        assert!(!view.table.is_loading);
        let values: Vec<_> = view.table.rows.iter().map(|r| r.web_vital.text()).collect();
        assert_eq!(values, ["5.00s", "1.80s", "500ms"]);
        assert!(view.errors.is_empty());
    }

    #[tokio::test]
    async fn stale_responses_are_discarded() {
        let service = seeded_service();
        let mut panel = DetailPanel::new(Arc::clone(&service));

        panel.open(WebVital::Lcp);
        // Let the first request finish before switching vital
        run_spawned().await;
        let first = panel.request().cloned();

        panel.open(WebVital::Fcp);
        let second = panel.request().cloned();
        assert_ne!(first.as_ref().map(|r| r.seq), second.as_ref().map(|r| r.seq));

        let updates = panel.settle().await;
        let discarded = updates
            .iter()
            .filter(|u| matches!(u, PanelUpdate::Discarded(_)))
            .count();
        let applied = updates
            .iter()
            .filter(|u| matches!(u, PanelUpdate::Applied(_)))
            .count();
        assert_eq!(discarded, 5);
        assert_eq!(applied, 5);

        // Every stored bucket is keyed to FCP
        assert_eq!(panel.buckets().vital(), Some(WebVital::Fcp));
        assert_eq!(panel.state(), PanelState::Open(WebVital::Fcp));
    }

    #[tokio::test]
    async fn superseded_slow_request_never_applies() {
        let service = Arc::new(FakeService::gated());
        service.insert_samples([
            sample(1, Some(500.0)),
            {
                let mut s = sample(2, Some(600.0));
                s.transaction = "/".to_string();
                s
            },
        ]);
        let mut panel = DetailPanel::new(Arc::clone(&service));

        panel.open(WebVital::Lcp);
        run_spawned().await;
        assert!(panel.is_loading());

        panel.set_transaction(Some("/checkout".to_string()));
        let key = panel.request().map(|r| r.key.clone());
        assert_eq!(
            key,
            Some(RequestKey {
                vital: WebVital::Lcp,
                transaction: Some("/checkout".to_string()),
            })
        );

        service.release();
        let updates = panel.settle().await;
        assert!(updates.iter().all(|u| matches!(u, PanelUpdate::Applied(_))));

        let merged = panel.samples();
        assert!(!merged.is_loading);
        assert!(merged
            .samples
            .iter()
            .all(|s| s.sample.transaction == "/checkout"));
        assert_eq!(
            panel.percentiles().ready().and_then(|p| p.transaction.as_deref()),
            Some("/checkout")
        );
    }

    #[tokio::test]
    async fn loading_until_every_bucket_resolves() {
        let service = Arc::new(FakeService::gated());
        let mut panel = DetailPanel::new(Arc::clone(&service));
        panel.open(WebVital::Cls);
        run_spawned().await;

        let routes = PathRoutes::new("acme");
        let view = panel.snapshot(&ViewContext::new(&routes));
        assert!(view.table.is_loading);
        assert!(view.table.rows.is_empty());
        assert_eq!(view.header, None);

        service.release();
        panel.settle().await;
        let view = panel.snapshot(&ViewContext::new(&routes));
        assert!(!view.table.is_loading);
        // No percentiles recorded, so no header
        assert_eq!(view.header, None);
    }

    #[tokio::test]
    async fn close_forgets_and_reopen_refetches() {
        let service = seeded_service();
        let mut panel = DetailPanel::new(Arc::clone(&service));

        panel.open(WebVital::Lcp);
        panel.settle().await;
        assert!(panel.percentiles().ready().is_some());

        panel.open(WebVital::Lcp);
        run_spawned().await;
        panel.close();
        assert_eq!(panel.state(), PanelState::Closed);
        assert_eq!(panel.request(), None);
        assert_eq!(panel.percentiles(), &Fetch::Idle);
        assert!(!panel.is_loading());
        assert_eq!(panel.next_update().await, PanelUpdate::Idle);

        let routes = PathRoutes::new("acme");
        let view = panel.snapshot(&ViewContext::new(&routes));
        assert_eq!(view.vital, None);
        assert!(view.table.rows.is_empty());

        panel.open(WebVital::Lcp);
        assert!(panel.is_loading());
        panel.settle().await;
        assert_eq!(service.percentile_calls(), 3);
    }

    #[tokio::test]
    async fn panicking_fetch_still_settles() {
        let service = seeded_service();
        service.panic_on_percentiles();
        let mut panel = DetailPanel::new(Arc::clone(&service));

        panel.open(WebVital::Lcp);
        let updates = tokio::time::timeout(Duration::from_secs(2), panel.settle())
            .await
            .expect("panel settles after a fetch panics");
        assert_eq!(updates.len(), 5);
        assert!(updates.contains(&PanelUpdate::Applied(FetchKind::Percentiles)));

        assert!(!panel.is_loading());
        assert!(matches!(
            panel.percentiles().error(),
            Some(QueryError::Transport(_))
        ));
        assert!(panel.timeseries().ready().is_some());
        assert_eq!(panel.samples().samples.len(), 3);

        let routes = PathRoutes::new("acme");
        let view = panel.snapshot(&ViewContext::new(&routes));
        assert_eq!(view.header, None);
        assert_eq!(view.errors.len(), 1);
    }

    #[tokio::test]
    async fn transaction_change_while_closed_fetches_nothing() {
        let service = seeded_service();
        let mut panel = DetailPanel::new(Arc::clone(&service));
        panel.set_transaction(Some("/checkout".to_string()));
        assert_eq!(panel.transaction(), Some("/checkout"));
        assert_eq!(panel.request(), None);
        run_spawned().await;
        assert_eq!(service.percentile_calls(), 0);

        panel.set_transaction(Some(String::new()));
        assert_eq!(panel.transaction(), None);
    }
}

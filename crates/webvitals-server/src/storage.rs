use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use webvitals_protocol::*;

/// Percentile reported by every aggregate query
const P75: f64 = 0.75;

/// In-memory transaction event store with TTL
pub struct SampleStore {
    events: DashMap<EventId, StoredEvent>,
    ttl: Duration,
    bucket_interval: Duration,
}

struct StoredEvent {
    event: TransactionEvent,
    ingested_at: SystemTime,
}

impl SampleStore {
    pub fn new(ttl: Duration, bucket_interval: Duration) -> Arc<Self> {
        let store = Arc::new(Self {
            events: DashMap::new(),
            ttl,
            bucket_interval: bucket_interval.max(Duration::from_secs(1)),
        });

        // Background task to clean up expired events
        let store_weak = Arc::downgrade(&store);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Some(store) = store_weak.upgrade() {
                    store.cleanup_expired();
                } else {
                    break;
                }
            }
        });

        store
    }

    /// Insert events, replacing any previous event with the same id
    pub fn ingest(&self, events: Vec<TransactionEvent>) -> u32 {
        let mut count = 0u32;
        let now = SystemTime::now();

        for event in events {
            self.events.insert(
                event.sample.id,
                StoredEvent {
                    event,
                    ingested_at: now,
                },
            );
            count = count.saturating_add(1);
        }

        tracing::debug!(count, total = self.events.len(), "ingested events");
        count
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// p75 of each vital over events matching the transaction filter
    pub fn project_percentiles(&self, transaction: Option<&str>) -> ProjectVitalPercentiles {
        let events = self.matching(transaction);
        let p75 = Measurements::from_fn(|vital| {
            percentile(
                events.iter().filter_map(|e| e.sample.measurement(vital)),
                P75,
            )
        });

        ProjectVitalPercentiles {
            transaction: transaction.map(str::to_string),
            p75,
            count: events.len() as u64,
        }
    }

    /// p75 of each vital per fixed-width time bucket, oldest first
    pub fn vital_timeseries(&self, transaction: Option<&str>) -> VitalTimeseries {
        let interval_secs = self.bucket_interval.as_secs().max(1);

        let mut buckets: BTreeMap<u64, Vec<TransactionEvent>> = BTreeMap::new();
        for event in self.matching(transaction) {
            let secs = event.sample.timestamp.as_secs();
            buckets
                .entry(secs - secs % interval_secs)
                .or_default()
                .push(event);
        }

        let series = VitalValues::from_fn(|vital| {
            buckets
                .iter()
                .map(|(start, events)| SeriesPoint {
                    name: Timestamp::from_secs(*start).to_rfc3339(),
                    value: percentile(
                        events.iter().filter_map(|e| e.sample.measurement(vital)),
                        P75,
                    ),
                })
                .collect()
        });

        VitalTimeseries {
            interval_secs,
            series,
        }
    }

    /// Events matching the transaction and threshold filters.
    ///
    /// Newest first; with `with_profiles`, events carrying a profile come
    /// before those without, otherwise profile ids are left out of the rows.
    pub fn transaction_samples(&self, query: &SampleQuery) -> Vec<TransactionSample> {
        let mut samples: Vec<TransactionSample> = self
            .matching(query.transaction.as_deref())
            .into_iter()
            .map(|event| event.sample)
            .filter(|sample| {
                query
                    .query
                    .as_ref()
                    .map_or(true, |q| q.matches(&sample.measurements))
            })
            .collect();

        if query.with_profiles {
            samples.sort_by_key(|s| (s.profile_id.is_none(), Reverse(s.timestamp), s.id));
        } else {
            samples.sort_by_key(|s| (Reverse(s.timestamp), s.id));
            for sample in &mut samples {
                sample.profile_id = None;
            }
        }

        samples.truncate(query.limit);
        samples
    }

    fn matching(&self, transaction: Option<&str>) -> Vec<TransactionEvent> {
        self.events
            .iter()
            .filter(|entry| transaction.map_or(true, |t| entry.event.sample.transaction == t))
            .map(|entry| entry.event.clone())
            .collect()
    }

    fn cleanup_expired(&self) {
        let now = SystemTime::now();
        let before = self.events.len();
        self.events.retain(|_, stored| {
            now.duration_since(stored.ingested_at).unwrap_or_default() < self.ttl
        });
        let expired = before.saturating_sub(self.events.len());
        if expired > 0 {
            tracing::debug!(expired, "dropped expired events");
        }
    }
}

/// Linearly interpolated percentile (`p` in `[0, 1]`) of the given values
fn percentile(values: impl Iterator<Item = f64>, p: f64) -> Option<f64> {
    let mut values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let rank = p.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

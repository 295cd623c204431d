use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::ids::{EventId, ProfileId, ReplayId};
use crate::vitals::{VitalValues, WebVital};

/// Timestamp in nanoseconds since UNIX epoch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// RFC 3339 rendering, or the raw nanosecond count if it can't be formatted
    pub fn to_rfc3339(&self) -> String {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0))
            .ok()
            .and_then(|t| t.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

/// Per-vital measurements; `None` means the event did not record that vital
pub type Measurements = VitalValues<Option<f64>>;

/// One sampled page-load transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionSample {
    pub id: EventId,
    pub replay_id: Option<ReplayId>,
    pub profile_id: Option<ProfileId>,
    pub transaction: String,
    pub project_slug: String,
    pub timestamp: Timestamp,
    pub measurements: Measurements,
    /// `transaction.duration`, in milliseconds
    pub duration_ms: Option<f64>,
}

impl TransactionSample {
    /// Raw measurement for a vital
    pub fn measurement(&self, vital: WebVital) -> Option<f64> {
        *self.measurements.get(vital)
    }
}

/// A transaction event as ingested by the store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub project_id: u64,
    #[serde(flatten)]
    pub sample: TransactionSample,
}

/// 75th percentile of each vital, scoped to a project and optionally a
/// single transaction
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectVitalPercentiles {
    pub transaction: Option<String>,
    pub p75: Measurements,
    /// Number of events the percentiles were computed over
    pub count: u64,
}

/// One point of a time series
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket start, RFC 3339
    pub name: String,
    pub value: Option<f64>,
}

/// p75 of each vital over fixed-width time buckets, oldest bucket first
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalTimeseries {
    pub interval_secs: u64,
    pub series: VitalValues<Vec<SeriesPoint>>,
}

impl VitalTimeseries {
    pub fn get(&self, vital: WebVital) -> &[SeriesPoint] {
        self.series.get(vital)
    }
}

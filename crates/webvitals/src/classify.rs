//! Good / meh / poor sample buckets.
//!
//! Events can't be queried by score, so the panel asks for a few events in
//! each threshold band of the selected vital and merges them, ordered by
//! the score of that vital.

use serde::Serialize;
use std::cmp::Ordering;
use webvitals_protocol::*;

use crate::score::{PerformanceScoreSet, ScoringProfile};

/// Events fetched per bucket by the detail panel
pub const DETAIL_PANEL_SAMPLE_LIMIT: usize = 3;

/// Threshold band of a vital
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleBucket {
    /// Strictly below the p90 threshold
    Good,
    /// At or above the p90 threshold, below the median threshold
    Meh,
    /// At or above the median threshold
    Poor,
}

impl SampleBucket {
    /// Merge order
    pub const ALL: [SampleBucket; 3] = [SampleBucket::Good, SampleBucket::Meh, SampleBucket::Poor];

    pub fn as_str(self) -> &'static str {
        match self {
            SampleBucket::Good => "good",
            SampleBucket::Meh => "meh",
            SampleBucket::Poor => "poor",
        }
    }

    /// Threshold filter selecting this band of `vital`
    pub fn search_query(self, vital: WebVital, profile: &ScoringProfile) -> SearchQuery {
        let p90 = profile.p90(vital);
        let median = profile.median(vital);

        match self {
            SampleBucket::Good => {
                SearchQuery::default().and(Comparison::new(vital, CompareOp::Lt, p90))
            }
            SampleBucket::Meh => SearchQuery::default()
                .and(Comparison::new(vital, CompareOp::Lt, median))
                .and(Comparison::new(vital, CompareOp::Ge, p90)),
            SampleBucket::Poor => {
                SearchQuery::default().and(Comparison::new(vital, CompareOp::Ge, median))
            }
        }
    }

    /// The sampled-events query for this band, asking for profiles
    pub fn sample_query(
        self,
        vital: WebVital,
        transaction: Option<String>,
        limit: usize,
        profile: &ScoringProfile,
    ) -> SampleQuery {
        SampleQuery {
            transaction,
            query: Some(self.search_query(vital, profile)),
            limit,
            with_profiles: true,
        }
    }
}

/// A sampled event annotated with its scores
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoredSample {
    #[serde(flatten)]
    pub sample: TransactionSample,
    pub scores: PerformanceScoreSet,
}

impl ScoredSample {
    pub fn new(sample: TransactionSample, profile: &ScoringProfile) -> Self {
        let scores = profile.calculate(&sample.measurements);
        Self { sample, scores }
    }

    /// `<vital>Score`
    pub fn score(&self, vital: WebVital) -> Option<f64> {
        self.scores.score(vital)
    }
}

/// Result slot of one bucket query
#[derive(Clone, Debug, Default, PartialEq)]
pub enum BucketSlot {
    /// No vital selected, so the query is skipped
    #[default]
    Disabled,
    Pending,
    Ready(Vec<TransactionSample>),
    Failed(QueryError),
}

impl BucketSlot {
    pub fn is_pending(&self) -> bool {
        matches!(self, BucketSlot::Pending)
    }
}

/// The merged sample list as the panel consumes it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedSamples {
    /// Ascending by the selected vital's score; empty while loading
    pub samples: Vec<ScoredSample>,
    /// True while any bucket query is in flight
    pub is_loading: bool,
    pub errors: Vec<QueryError>,
}

/// The three bucket slots of one vital selection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuckets {
    vital: Option<WebVital>,
    limit: usize,
    good: BucketSlot,
    meh: BucketSlot,
    poor: BucketSlot,
}

impl SampleBuckets {
    /// Slots for `vital`: all pending, or all disabled if no vital is selected
    pub fn new(vital: Option<WebVital>, limit: usize) -> Self {
        let slot = if vital.is_some() {
            BucketSlot::Pending
        } else {
            BucketSlot::Disabled
        };

        Self {
            vital,
            limit,
            good: slot.clone(),
            meh: slot.clone(),
            poor: slot,
        }
    }

    pub fn vital(&self) -> Option<WebVital> {
        self.vital
    }

    pub fn slot(&self, bucket: SampleBucket) -> &BucketSlot {
        match bucket {
            SampleBucket::Good => &self.good,
            SampleBucket::Meh => &self.meh,
            SampleBucket::Poor => &self.poor,
        }
    }

    fn slot_mut(&mut self, bucket: SampleBucket) -> &mut BucketSlot {
        match bucket {
            SampleBucket::Good => &mut self.good,
            SampleBucket::Meh => &mut self.meh,
            SampleBucket::Poor => &mut self.poor,
        }
    }

    /// Store a bucket's result. Only pending slots accept one; returns
    /// whether the result was kept.
    pub fn resolve(
        &mut self,
        bucket: SampleBucket,
        result: Result<Vec<TransactionSample>, QueryError>,
    ) -> bool {
        let slot = self.slot_mut(bucket);
        if !slot.is_pending() {
            tracing::debug!(bucket = bucket.as_str(), "ignoring result for a settled bucket");
            return false;
        }

        *slot = match result {
            Ok(samples) => BucketSlot::Ready(samples),
            Err(err) => {
                tracing::warn!(bucket = bucket.as_str(), "sample query failed: {}", err);
                BucketSlot::Failed(err)
            }
        };
        true
    }

    pub fn is_loading(&self) -> bool {
        SampleBucket::ALL
            .into_iter()
            .any(|bucket| self.slot(bucket).is_pending())
    }

    /// The combined list, or an empty loading result while any bucket is pending
    pub fn merged(&self, profile: &ScoringProfile) -> MergedSamples {
        if self.is_loading() {
            return MergedSamples {
                is_loading: true,
                ..Default::default()
            };
        }

        let Some(vital) = self.vital else {
            return MergedSamples::default();
        };

        let mut errors = Vec::new();
        let mut rows: [&[TransactionSample]; 3] = [&[], &[], &[]];
        for (i, bucket) in SampleBucket::ALL.into_iter().enumerate() {
            match self.slot(bucket) {
                BucketSlot::Ready(samples) => rows[i] = samples.as_slice(),
                BucketSlot::Failed(err) => errors.push(err.clone()),
                BucketSlot::Disabled | BucketSlot::Pending => {}
            }
        }

        let [good, meh, poor] = rows;
        MergedSamples {
            samples: merge_buckets(vital, good, meh, poor, self.limit, profile),
            is_loading: false,
            errors,
        }
    }
}

/// Concatenate good ++ meh ++ poor (each capped at `limit`), score every
/// sample, and stable-sort ascending by the score of `vital`
pub fn merge_buckets(
    vital: WebVital,
    good: &[TransactionSample],
    meh: &[TransactionSample],
    poor: &[TransactionSample],
    limit: usize,
    profile: &ScoringProfile,
) -> Vec<ScoredSample> {
    let mut merged: Vec<ScoredSample> = [good, meh, poor]
        .into_iter()
        .flat_map(|bucket| bucket.iter().take(limit))
        .map(|sample| ScoredSample::new(sample.clone(), profile))
        .collect();

    merged.sort_by(|a, b| compare_scores(a.score(vital), b.score(vital)));
    merged
}

/// Absent scores sort first
fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.total_cmp(&b),
    }
}

/// Fetch the three buckets of `vital` concurrently and merge them, using the
/// default threshold tables
pub async fn classify_and_merge_samples<S>(
    service: &S,
    vital: Option<WebVital>,
    transaction: Option<String>,
    limit: usize,
) -> MergedSamples
where
    S: VitalsQueryService + ?Sized,
{
    classify_and_merge_samples_with(service, &ScoringProfile::default(), vital, transaction, limit)
        .await
}

/// [`classify_and_merge_samples`] with custom threshold tables
pub async fn classify_and_merge_samples_with<S>(
    service: &S,
    profile: &ScoringProfile,
    vital: Option<WebVital>,
    transaction: Option<String>,
    limit: usize,
) -> MergedSamples
where
    S: VitalsQueryService + ?Sized,
{
    let mut buckets = SampleBuckets::new(vital, limit);
    let Some(vital) = vital else {
        return buckets.merged(profile);
    };

    let query = move |bucket: SampleBucket| {
        service.transaction_samples(bucket.sample_query(vital, transaction.clone(), limit, profile))
    };
    let (good, meh, poor) = tokio::join!(
        query(SampleBucket::Good),
        query(SampleBucket::Meh),
        query(SampleBucket::Poor),
    );

    buckets.resolve(SampleBucket::Good, good);
    buckets.resolve(SampleBucket::Meh, meh);
    buckets.resolve(SampleBucket::Poor, poor);
    buckets.merged(profile)
}

//! Performance scores.
//!
//! Each vital is scored on a log-normal curve anchored at two thresholds:
//! the p90 threshold scores 0.9 and the median threshold scores 0.5. The
//! combined score is the weighted mean of whichever vitals are present.

use serde::Serialize;
use webvitals_protocol::*;

/// `erfc⁻¹(0.2)`: the standardized distance that maps the p90 threshold to 0.9
const INVERSE_ERFC_ONE_FIFTH: f64 = 0.906_193_802_436_823_2;

/// Highest score a value above the p90 threshold can get
const BELOW_GOOD: f64 = 0.899_999_999_999_9;

/// Highest score a value above the median threshold can get
const BELOW_MEH: f64 = 0.499_999_999_99;

/// Threshold and weight tables used to score and bucket vitals.
///
/// # Invariants
/// - every threshold is finite and strictly positive
/// - `p90 <= median` for every vital
/// - every weight is finite and non-negative
#[derive(Clone, Debug, PartialEq)]
pub struct ScoringProfile {
    p90s: VitalValues<f64>,
    medians: VitalValues<f64>,
    weights: VitalValues<f64>,
}

impl ScoringProfile {
    pub fn new(
        p90s: VitalValues<f64>,
        medians: VitalValues<f64>,
        weights: VitalValues<f64>,
    ) -> Result<Self, ProfileError> {
        for vital in WebVital::ALL {
            let p90 = *p90s.get(vital);
            let median = *medians.get(vital);
            let weight = *weights.get(vital);

            if !(p90.is_finite() && p90 > 0.0 && median.is_finite() && median > 0.0) {
                return Err(ProfileError::InvalidThreshold { vital });
            }
            if p90 > median {
                return Err(ProfileError::InvertedThresholds { vital, p90, median });
            }
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ProfileError::InvalidWeight { vital });
            }
        }

        Ok(Self {
            p90s,
            medians,
            weights,
        })
    }

    /// Replace one vital's thresholds, keeping everything else
    pub fn with_thresholds(
        mut self,
        vital: WebVital,
        p90: f64,
        median: f64,
    ) -> Result<Self, ProfileError> {
        self.p90s.set(vital, p90);
        self.medians.set(vital, median);
        Self::new(self.p90s, self.medians, self.weights)
    }

    pub fn p90(&self, vital: WebVital) -> f64 {
        *self.p90s.get(vital)
    }

    pub fn median(&self, vital: WebVital) -> f64 {
        *self.medians.get(vital)
    }

    pub fn weight(&self, vital: WebVital) -> f64 {
        *self.weights.get(vital)
    }

    /// Score one measurement. Absent and non-finite values have no score.
    pub fn score_vital(&self, vital: WebVital, value: Option<f64>) -> Option<f64> {
        value
            .filter(|v| v.is_finite())
            .map(|v| log_normal_score(v, self.p90(vital), self.median(vital)))
    }

    /// Score every vital and combine them
    pub fn calculate(&self, measurements: &Measurements) -> PerformanceScoreSet {
        let scores = measurements.map(|vital, value| self.score_vital(vital, *value));

        let mut weighted = 0.0_f64;
        let mut total_weight = 0.0_f64;
        let mut unweighted = 0.0_f64;
        let mut present = 0u32;
        for (vital, score) in scores.iter() {
            if let Some(score) = *score {
                weighted += score * self.weight(vital);
                total_weight += self.weight(vital);
                unweighted += score;
                present += 1;
            }
        }

        let total = match present {
            0 => None,
            _ if total_weight > 0.0 => Some(weighted / total_weight),
            // Only zero-weight vitals present: fall back to a plain mean
            n => Some(unweighted / f64::from(n)),
        };

        PerformanceScoreSet { scores, total }
    }
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self {
            p90s: PERFORMANCE_SCORE_P90S,
            medians: PERFORMANCE_SCORE_MEDIANS,
            weights: PERFORMANCE_SCORE_WEIGHTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("{vital} thresholds must be finite and positive")]
    InvalidThreshold { vital: WebVital },
    #[error("{vital} p90 threshold {p90} is above its median threshold {median}")]
    InvertedThresholds {
        vital: WebVital,
        p90: f64,
        median: f64,
    },
    #[error("{vital} weight must be finite and non-negative")]
    InvalidWeight { vital: WebVital },
}

/// Per-vital scores in `[0, 1]` plus the combined score
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PerformanceScoreSet {
    pub scores: VitalValues<Option<f64>>,
    pub total: Option<f64>,
}

impl PerformanceScoreSet {
    /// The `<vital>Score` of this set
    pub fn score(&self, vital: WebVital) -> Option<f64> {
        *self.scores.get(vital)
    }
}

/// Score measurements against the default tables
pub fn calculate_performance_score(measurements: &Measurements) -> PerformanceScoreSet {
    ScoringProfile::default().calculate(measurements)
}

/// Score a project's p75 values against the default tables
pub fn compute_scores(percentiles: &ProjectVitalPercentiles) -> PerformanceScoreSet {
    calculate_performance_score(&percentiles.p75)
}

/// Log-normal score of `value`, clamped so the three bands never overlap.
///
/// `value <= p90` scores in `[0.9, 1]`, `value < median` in `[0.5, 0.9)`,
/// anything from the median up in `[0, 0.5)`, matching the poor bucket's
/// `>=median` query. Non-increasing in `value`.
pub fn log_normal_score(value: f64, p90: f64, median: f64) -> f64 {
    if value <= 0.0 {
        return 1.0;
    }
    if p90 >= median {
        return if value <= median { 1.0 } else { 0.0 };
    }

    let standardized = (value / median).ln() * INVERSE_ERFC_ONE_FIFTH / -(p90 / median).ln();
    let raw = 0.5 * erfc(standardized);

    if value <= p90 {
        raw.clamp(0.9, 1.0)
    } else if value < median {
        raw.clamp(0.5, BELOW_GOOD)
    } else {
        raw.clamp(0.0, BELOW_MEH)
    }
}

/// Complementary error function (Abramowitz & Stegun 7.1.26, |ε| < 1.5e-7)
fn erfc(x: f64) -> f64 {
    1.0 - erf(x)
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = t * (A1 + t * (A2 + t * (A3 + t * (A4 + t * A5))));
    sign * (1.0 - y * (-x * x).exp())
}

/// Score band used for badges
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreGrade {
    Good,
    NeedsImprovement,
    Poor,
}

impl ScoreGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            ScoreGrade::Good
        } else if score >= 0.5 {
            ScoreGrade::NeedsImprovement
        } else {
            ScoreGrade::Poor
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ScoreGrade::Good => "Good",
            ScoreGrade::NeedsImprovement => "Meh",
            ScoreGrade::Poor => "Poor",
        }
    }
}

/// Score as a whole percentage, as shown on badges
pub fn as_percent(score: f64) -> u8 {
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}

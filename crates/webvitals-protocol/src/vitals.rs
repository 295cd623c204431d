use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A standardized web performance measurement
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebVital {
    /// Largest Contentful Paint
    Lcp,
    /// First Contentful Paint
    Fcp,
    /// Cumulative Layout Shift
    Cls,
    /// Time To First Byte
    Ttfb,
    /// First Input Delay
    Fid,
}

impl WebVital {
    pub const ALL: [WebVital; 5] = [
        WebVital::Lcp,
        WebVital::Fcp,
        WebVital::Cls,
        WebVital::Ttfb,
        WebVital::Fid,
    ];

    /// Lowercase short name, as used in query strings
    pub fn as_str(self) -> &'static str {
        match self {
            WebVital::Lcp => "lcp",
            WebVital::Fcp => "fcp",
            WebVital::Cls => "cls",
            WebVital::Ttfb => "ttfb",
            WebVital::Fid => "fid",
        }
    }

    /// Name of the measurement field on transaction events
    pub fn measurement_field(self) -> &'static str {
        match self {
            WebVital::Lcp => "measurements.lcp",
            WebVital::Fcp => "measurements.fcp",
            WebVital::Cls => "measurements.cls",
            WebVital::Ttfb => "measurements.ttfb",
            WebVital::Fid => "measurements.fid",
        }
    }

    /// Get the display label for this vital
    pub fn label(self) -> &'static str {
        match self {
            WebVital::Lcp => "Largest Contentful Paint",
            WebVital::Fcp => "First Contentful Paint",
            WebVital::Cls => "Cumulative Layout Shift",
            WebVital::Ttfb => "Time To First Byte",
            WebVital::Fid => "First Input Delay",
        }
    }

    /// Everything but CLS is measured in milliseconds; CLS is unitless
    pub fn is_duration(self) -> bool {
        !matches!(self, WebVital::Cls)
    }
}

impl fmt::Display for WebVital {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebVital {
    type Err = UnknownVital;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WebVital::ALL
            .into_iter()
            .find(|vital| vital.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVital(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown web vital: {0:?}")]
pub struct UnknownVital(pub String);

/// One value per vital.
///
/// Lookups go through [`VitalValues::get`], which matches on the vital
/// exhaustively, so adding a vital is a compile error until every table
/// covers it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalValues<T> {
    pub lcp: T,
    pub fcp: T,
    pub cls: T,
    pub ttfb: T,
    pub fid: T,
}

impl<T> VitalValues<T> {
    /// Build a table by computing each vital's value
    pub fn from_fn(mut f: impl FnMut(WebVital) -> T) -> Self {
        Self {
            lcp: f(WebVital::Lcp),
            fcp: f(WebVital::Fcp),
            cls: f(WebVital::Cls),
            ttfb: f(WebVital::Ttfb),
            fid: f(WebVital::Fid),
        }
    }

    pub fn get(&self, vital: WebVital) -> &T {
        match vital {
            WebVital::Lcp => &self.lcp,
            WebVital::Fcp => &self.fcp,
            WebVital::Cls => &self.cls,
            WebVital::Ttfb => &self.ttfb,
            WebVital::Fid => &self.fid,
        }
    }

    pub fn get_mut(&mut self, vital: WebVital) -> &mut T {
        match vital {
            WebVital::Lcp => &mut self.lcp,
            WebVital::Fcp => &mut self.fcp,
            WebVital::Cls => &mut self.cls,
            WebVital::Ttfb => &mut self.ttfb,
            WebVital::Fid => &mut self.fid,
        }
    }

    pub fn set(&mut self, vital: WebVital, value: T) {
        *self.get_mut(vital) = value;
    }

    pub fn map<U>(&self, mut f: impl FnMut(WebVital, &T) -> U) -> VitalValues<U> {
        VitalValues::from_fn(|vital| f(vital, self.get(vital)))
    }

    /// Iterate in [`WebVital::ALL`] order
    pub fn iter(&self) -> impl Iterator<Item = (WebVital, &T)> + '_ {
        WebVital::ALL.into_iter().map(move |vital| (vital, self.get(vital)))
    }
}

/// Good/meh boundary per vital: values at or below score at least 0.9
pub const PERFORMANCE_SCORE_P90S: VitalValues<f64> = VitalValues {
    lcp: 1200.0,
    fcp: 900.0,
    cls: 0.1,
    ttfb: 200.0,
    fid: 100.0,
};

/// Meh/poor boundary per vital: values above score below 0.5
pub const PERFORMANCE_SCORE_MEDIANS: VitalValues<f64> = VitalValues {
    lcp: 2400.0,
    fcp: 1600.0,
    cls: 0.25,
    ttfb: 400.0,
    fid: 300.0,
};

/// Relative weight of each vital in the combined score
pub const PERFORMANCE_SCORE_WEIGHTS: VitalValues<f64> = VitalValues {
    lcp: 30.0,
    fcp: 15.0,
    cls: 15.0,
    ttfb: 10.0,
    fid: 30.0,
};

//! Threshold filters in the `measurements.<vital>:<op><value>` syntax.
//!
//! A query is a whitespace-separated conjunction of terms, for example
//! `measurements.lcp:<2400 measurements.lcp:>=1200`. The operator is one of
//! `<`, `<=`, `>`, `>=`, or empty for equality. Formatting a parsed query
//! reproduces its canonical text exactly.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sample::Measurements;
use crate::vitals::WebVital;

const MEASUREMENT_PREFIX: &str = "measurements.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "",
        }
    }

    pub fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
        }
    }

    /// Split a leading operator off `s`. Two-char operators are tried first.
    fn split_prefix(s: &str) -> (Self, &str) {
        for op in [CompareOp::Le, CompareOp::Ge, CompareOp::Lt, CompareOp::Gt] {
            if let Some(rest) = s.strip_prefix(op.as_str()) {
                return (op, rest);
            }
        }
        (CompareOp::Eq, s)
    }
}

/// A single `measurements.<vital>:<op><value>` term
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Comparison {
    pub vital: WebVital,
    pub op: CompareOp,
    pub value: f64,
}

impl Comparison {
    pub fn new(vital: WebVital, op: CompareOp, value: f64) -> Self {
        Self { vital, op, value }
    }

    /// An absent measurement never satisfies a comparison
    pub fn matches(&self, measurements: &Measurements) -> bool {
        measurements
            .get(self.vital)
            .is_some_and(|value| self.op.eval(value, self.value))
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}",
            self.vital.measurement_field(),
            self.op.as_str(),
            self.value
        )
    }
}

/// Conjunction of comparisons; the empty query matches everything
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SearchQuery {
    terms: Vec<Comparison>,
}

impl SearchQuery {
    pub fn new(terms: Vec<Comparison>) -> Self {
        Self { terms }
    }

    /// Append a term
    pub fn and(mut self, term: Comparison) -> Self {
        self.terms.push(term);
        self
    }

    pub fn terms(&self) -> &[Comparison] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, measurements: &Measurements) -> bool {
        self.terms.iter().all(|term| term.matches(measurements))
    }

    pub fn parse(s: &str) -> Result<Self, SearchQueryError> {
        let terms = s
            .split_whitespace()
            .map(parse_term)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { terms })
    }
}

fn parse_term(term: &str) -> Result<Comparison, SearchQueryError> {
    let (field, condition) = term
        .split_once(':')
        .ok_or_else(|| SearchQueryError::MissingCondition(term.to_string()))?;

    let vital_name = field
        .strip_prefix(MEASUREMENT_PREFIX)
        .ok_or_else(|| SearchQueryError::UnknownField(field.to_string()))?;
    let vital = vital_name
        .parse::<WebVital>()
        .map_err(|_| SearchQueryError::UnknownField(field.to_string()))?;

    let (op, number) = CompareOp::split_prefix(condition);
    let value = number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| SearchQueryError::InvalidNumber(term.to_string()))?;

    Ok(Comparison { vital, op, value })
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for SearchQuery {
    type Err = SearchQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SearchQuery {
    type Error = SearchQueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<SearchQuery> for String {
    fn from(query: SearchQuery) -> Self {
        query.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchQueryError {
    #[error("term {0:?} has no `:` condition")]
    MissingCondition(String),
    #[error("unsupported field {0:?}")]
    UnknownField(String),
    #[error("term {0:?} does not compare against a finite number")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcp(value: f64) -> Measurements {
        Measurements {
            lcp: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn formats_bucket_queries_exactly() {
        let good = SearchQuery::new(vec![Comparison::new(WebVital::Lcp, CompareOp::Lt, 1200.0)]);
        assert_eq!(good.to_string(), "measurements.lcp:<1200");

        let meh = SearchQuery::default()
            .and(Comparison::new(WebVital::Cls, CompareOp::Lt, 0.25))
            .and(Comparison::new(WebVital::Cls, CompareOp::Ge, 0.1));
        assert_eq!(meh.to_string(), "measurements.cls:<0.25 measurements.cls:>=0.1");
    }

    #[test]
    fn parses_what_it_prints() {
        for text in [
            "measurements.lcp:<1200",
            "measurements.ttfb:<400 measurements.ttfb:>=200",
            "measurements.fid:>=300",
            "measurements.fcp:<=900.5",
            "measurements.cls:0",
        ] {
            let query = SearchQuery::parse(text).unwrap();
            assert_eq!(query.to_string(), text);
        }
    }

    #[test]
    fn parses_operators() {
        let query = SearchQuery::parse("measurements.lcp:>=2400").unwrap();
        assert_eq!(
            query.terms(),
            [Comparison::new(WebVital::Lcp, CompareOp::Ge, 2400.0)]
        );
        let query = SearchQuery::parse("measurements.lcp:>2400").unwrap();
        assert_eq!(query.terms()[0].op, CompareOp::Gt);
    }

    #[test]
    fn empty_query_matches_everything() {
        let query = SearchQuery::parse("   ").unwrap();
        assert!(query.is_empty());
        assert!(query.matches(&Measurements::default()));
    }

    #[test]
    fn meh_range_is_half_open() {
        let meh = SearchQuery::parse("measurements.lcp:<2400 measurements.lcp:>=1200").unwrap();
        assert!(!meh.matches(&lcp(1199.0)));
        assert!(meh.matches(&lcp(1200.0)));
        assert!(meh.matches(&lcp(2399.0)));
        assert!(!meh.matches(&lcp(2400.0)));
    }

    #[test]
    fn absent_measurement_never_matches() {
        let query = SearchQuery::parse("measurements.cls:<0.1").unwrap();
        assert!(!query.matches(&lcp(10.0)));
    }

    #[test]
    fn rejects_malformed_terms() {
        assert_eq!(
            SearchQuery::parse("measurements.lcp"),
            Err(SearchQueryError::MissingCondition("measurements.lcp".into()))
        );
        assert_eq!(
            SearchQuery::parse("transaction.duration:<10"),
            Err(SearchQueryError::UnknownField("transaction.duration".into()))
        );
        assert_eq!(
            SearchQuery::parse("measurements.inp:<10"),
            Err(SearchQueryError::UnknownField("measurements.inp".into()))
        );
        assert_eq!(
            SearchQuery::parse("measurements.lcp:<fast"),
            Err(SearchQueryError::InvalidNumber("measurements.lcp:<fast".into()))
        );
        assert!(SearchQuery::parse("measurements.lcp:<inf").is_err());
    }

    #[test]
    fn serializes_as_query_text() {
        let query = SearchQuery::parse("measurements.fid:>=300").unwrap();
        let json = serde_json::to_string(&query).unwrap();
        assert_eq!(json, "\"measurements.fid:>=300\"");
        let back: SearchQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, query);
    }
}

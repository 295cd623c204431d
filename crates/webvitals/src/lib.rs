//! Web Vitals scoring and the detail panel model.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webvitals::{DetailPanel, PathRoutes, ViewContext, VitalsClient, WebVital};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(VitalsClient::new("http://localhost:1990")?);
//!
//!     let mut panel = DetailPanel::new(client);
//!     panel.set_transaction(Some("/checkout".to_string()));
//!     panel.open(WebVital::Lcp);
//!     panel.settle().await;
//!
//!     let routes = PathRoutes::new("acme");
//!     let view = panel.snapshot(&ViewContext::new(&routes));
//!     for row in &view.table.rows {
//!         println!("{} {}", row.transaction.text(), row.web_vital.text());
//!     }
//!     Ok(())
//! }
//! ```

mod classify;
mod client;
mod panel;
mod score;
mod view;

#[cfg(test)]
mod testing;

pub use webvitals_protocol::*;

pub use classify::{
    classify_and_merge_samples, classify_and_merge_samples_with, merge_buckets, BucketSlot,
    MergedSamples, SampleBucket, SampleBuckets, ScoredSample, DETAIL_PANEL_SAMPLE_LIMIT,
};
pub use client::{ClientError, VitalsClient, DEFAULT_URL, URL_ENV};
pub use panel::{
    DetailPanel, Fetch, FetchKind, PanelRequest, PanelState, PanelUpdate, RequestKey,
};
pub use score::{
    as_percent, calculate_performance_score, compute_scores, log_normal_score,
    PerformanceScoreSet, ProfileError, ScoreGrade, ScoringProfile,
};
pub use view::{
    detail_header, format_header_value, format_sample_value, line_series, sample_row,
    sample_table, Cell, Column, DetailHeader, LineSeries, PanelView, PathRoutes, Routes,
    SampleRow, SampleTable, SortBy, ViewContext, NO_VALUE,
};

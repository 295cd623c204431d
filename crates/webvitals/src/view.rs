//! Turns scored panel data into plain rows, cells and series.
//!
//! Nothing here renders; a UI (or the CLI demo) walks the structures.

use serde::Serialize;
use webvitals_protocol::*;

use crate::classify::{MergedSamples, ScoredSample};
use crate::score::{as_percent, ScoreGrade, ScoringProfile};

/// Placeholder for absent values and ids
pub const NO_VALUE: &str = "(no value)";

/// Link targets for the sample table. Supplied by the surrounding app.
pub trait Routes: Send + Sync {
    fn transaction_details(&self, project_slug: &str, event_id: &EventId) -> String;
    fn replay_details(&self, replay_id: &ReplayId, event_id: &EventId) -> String;
    fn profile_flamechart(&self, project_slug: &str, profile_id: &ProfileId) -> String;
}

/// Relative paths under an organization
#[derive(Clone, Debug)]
pub struct PathRoutes {
    pub org_slug: String,
}

impl PathRoutes {
    pub fn new(org_slug: impl Into<String>) -> Self {
        Self {
            org_slug: org_slug.into(),
        }
    }
}

impl Routes for PathRoutes {
    fn transaction_details(&self, project_slug: &str, event_id: &EventId) -> String {
        format!(
            "/organizations/{}/performance/{}:{}/",
            self.org_slug, project_slug, event_id
        )
    }

    fn replay_details(&self, replay_id: &ReplayId, event_id: &EventId) -> String {
        format!(
            "/organizations/{}/replays/{}/?event_id={}",
            self.org_slug, replay_id, event_id
        )
    }

    fn profile_flamechart(&self, project_slug: &str, profile_id: &ProfileId) -> String {
        format!(
            "/organizations/{}/profiling/profile/{}/{}/flamechart/",
            self.org_slug, project_slug, profile_id
        )
    }
}

/// What the table needs from its surroundings
#[derive(Clone, Copy)]
pub struct ViewContext<'a> {
    pub routes: &'a dyn Routes,
    /// Slug of the single selected project, if exactly one is selected
    pub selected_project: Option<&'a str>,
}

impl<'a> ViewContext<'a> {
    pub fn new(routes: &'a dyn Routes) -> Self {
        Self {
            routes,
            selected_project: None,
        }
    }

    pub fn with_project(mut self, project_slug: &'a str) -> Self {
        self.selected_project = Some(project_slug);
        self
    }

    fn project_slug<'s>(&self, sample: &'s TransactionSample) -> &'s str
    where
        'a: 's,
    {
        self.selected_project.unwrap_or(&sample.project_slug)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cell {
    Text { text: String },
    Link { text: String, href: String },
    NoValue,
    Badge { percent: u8, grade: ScoreGrade },
    Empty,
}

impl Cell {
    /// Text as it would be displayed
    pub fn text(&self) -> String {
        match self {
            Cell::Text { text } | Cell::Link { text, .. } => text.clone(),
            Cell::NoValue => NO_VALUE.to_string(),
            Cell::Badge { percent, .. } => percent.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub key: &'static str,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleRow {
    pub transaction: Cell,
    pub replay: Cell,
    pub profile: Cell,
    pub web_vital: Cell,
    pub score: Cell,
}

impl SampleRow {
    /// Cells in column order
    pub fn cells(&self) -> [&Cell; 5] {
        [
            &self.transaction,
            &self.replay,
            &self.profile,
            &self.web_vital,
            &self.score,
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SortBy {
    pub key: &'static str,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleTable {
    pub columns: Vec<Column>,
    /// Rows in ascending score order
    pub rows: Vec<SampleRow>,
    /// Display hint for the grid's sort indicator
    pub sort: SortBy,
    pub is_loading: bool,
}

/// The vital's p75 and score, shown above the chart
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetailHeader {
    pub vital: WebVital,
    pub value: String,
    pub score: f64,
    pub percent: u8,
    pub grade: ScoreGrade,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LineSeries {
    pub series_name: String,
    pub points: Vec<SeriesPoint>,
}

/// Everything the detail panel shows
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PanelView {
    pub vital: Option<WebVital>,
    pub header: Option<DetailHeader>,
    pub series: LineSeries,
    pub table: SampleTable,
    pub errors: Vec<String>,
}

/// Sample table cell value: whole milliseconds below one second, seconds
/// with two decimals above
pub fn format_sample_value(vital: WebVital, value: f64) -> String {
    if !vital.is_duration() {
        format!("{:.2}", value)
    } else if value < 1000.0 {
        format!("{:.0}ms", value)
    } else {
        format!("{:.2}s", value / 1000.0)
    }
}

/// Header value: always seconds with two decimals for durations
pub fn format_header_value(vital: WebVital, value: f64) -> String {
    if vital.is_duration() {
        format!("{:.2}s", value / 1000.0)
    } else {
        format!("{:.2}", value)
    }
}

/// The header, or `None` unless the vital's p75 has a score
pub fn detail_header(
    vital: Option<WebVital>,
    percentiles: Option<&ProjectVitalPercentiles>,
    profile: &ScoringProfile,
) -> Option<DetailHeader> {
    let vital = vital?;
    let p75 = (*percentiles?.p75.get(vital))?;
    let score = profile.score_vital(vital, Some(p75))?;

    Some(DetailHeader {
        vital,
        value: format_header_value(vital, p75),
        score,
        percent: as_percent(score),
        grade: ScoreGrade::from_score(score),
    })
}

/// The selected vital's series; empty while loading or with no vital
pub fn line_series(vital: Option<WebVital>, timeseries: Option<&VitalTimeseries>) -> LineSeries {
    match vital {
        Some(vital) => LineSeries {
            series_name: vital.to_string(),
            points: timeseries
                .map(|ts| ts.get(vital).to_vec())
                .unwrap_or_default(),
        },
        None => LineSeries::default(),
    }
}

pub fn columns(vital: Option<WebVital>) -> Vec<Column> {
    let vital_name = vital.map(|v| v.to_string()).unwrap_or_default();
    vec![
        Column {
            key: "id",
            name: "Transaction".to_string(),
        },
        Column {
            key: "replayId",
            name: "Replay".to_string(),
        },
        Column {
            key: "profile.id",
            name: "Profile".to_string(),
        },
        Column {
            key: "webVital",
            name: vital_name.clone(),
        },
        Column {
            key: "score",
            name: format!("{} Score", vital_name).trim_start().to_string(),
        },
    ]
}

pub fn sample_row(ctx: &ViewContext<'_>, vital: WebVital, scored: &ScoredSample) -> SampleRow {
    let sample = &scored.sample;
    let project_slug = ctx.project_slug(sample);

    let transaction = Cell::Link {
        text: sample.id.short(),
        href: ctx.routes.transaction_details(project_slug, &sample.id),
    };

    let replay = match (&sample.replay_id, sample.duration_ms) {
        (Some(replay_id), Some(_)) => Cell::Link {
            text: replay_id.short(),
            href: ctx.routes.replay_details(replay_id, &sample.id),
        },
        _ => Cell::NoValue,
    };

    let profile = match (ctx.selected_project, &sample.profile_id) {
        (Some(_), Some(profile_id)) => Cell::Link {
            text: profile_id.short(),
            href: ctx.routes.profile_flamechart(project_slug, profile_id),
        },
        _ => Cell::NoValue,
    };

    let value = sample.measurement(vital);
    let web_vital = match value {
        Some(value) => Cell::Text {
            text: format_sample_value(vital, value),
        },
        None => Cell::NoValue,
    };

    let score = match (value, scored.score(vital)) {
        (Some(_), Some(score)) => Cell::Badge {
            percent: as_percent(score),
            grade: ScoreGrade::from_score(score),
        },
        _ => Cell::Empty,
    };

    SampleRow {
        transaction,
        replay,
        profile,
        web_vital,
        score,
    }
}

pub fn sample_table(
    ctx: &ViewContext<'_>,
    vital: Option<WebVital>,
    merged: &MergedSamples,
) -> SampleTable {
    let rows = match vital {
        Some(vital) => merged
            .samples
            .iter()
            .map(|scored| sample_row(ctx, vital, scored))
            .collect(),
        None => Vec::new(),
    };

    SampleTable {
        columns: columns(vital),
        rows,
        sort: SortBy {
            key: "score",
            descending: true,
        },
        is_loading: merged.is_loading,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample;

    fn routes() -> PathRoutes {
        PathRoutes::new("acme")
    }

    fn scored(n: u8, lcp: Option<f64>) -> ScoredSample {
        ScoredSample::new(sample(n, lcp), &ScoringProfile::default())
    }

    #[test]
    fn formats_sample_values() {
        assert_eq!(format_sample_value(WebVital::Lcp, 532.4), "532ms");
        assert_eq!(format_sample_value(WebVital::Lcp, 999.4), "999ms");
        assert_eq!(format_sample_value(WebVital::Lcp, 2500.0), "2.50s");
        assert_eq!(format_sample_value(WebVital::Cls, 0.123), "0.12");
        assert_eq!(format_header_value(WebVital::Ttfb, 450.0), "0.45s");
        assert_eq!(format_header_value(WebVital::Cls, 0.05), "0.05");
    }

    #[test]
    fn no_header_without_a_score() {
        let profile = ScoringProfile::default();
        let empty = ProjectVitalPercentiles::default();
        assert_eq!(detail_header(Some(WebVital::Lcp), Some(&empty), &profile), None);
        assert_eq!(detail_header(Some(WebVital::Lcp), None, &profile), None);

        let loaded = ProjectVitalPercentiles {
            p75: Measurements {
                lcp: Some(1800.0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(detail_header(None, Some(&loaded), &profile), None);

        let header = detail_header(Some(WebVital::Lcp), Some(&loaded), &profile).unwrap();
        assert_eq!(header.value, "1.80s");
        assert_eq!(header.grade, ScoreGrade::NeedsImprovement);
    }

    #[test]
    fn rows_link_ids() {
        let routes = routes();
        let ctx = ViewContext::new(&routes).with_project("storefront");
        let row = sample_row(&ctx, WebVital::Lcp, &scored(1, Some(900.0)));

        assert_eq!(
            row.transaction,
            Cell::Link {
                text: "01010101".to_string(),
                href: "/organizations/acme/performance/storefront:01010101010101010101010101010101/"
                    .to_string(),
            }
        );
        assert_eq!(row.replay.text(), "65656565");
        assert!(matches!(
            &row.profile,
            Cell::Link { href, .. } if href.starts_with("/organizations/acme/profiling/profile/storefront/")
        ));
        assert_eq!(row.web_vital.text(), "900ms");
        assert!(matches!(row.score, Cell::Badge { grade: ScoreGrade::Good, .. }));
    }

    #[test]
    fn missing_ids_degrade_to_no_value() {
        let routes = routes();
        let mut s = scored(2, None);
        s.sample.replay_id = None;

        // No selected project: profile can't be linked even with an id
        let ctx = ViewContext::new(&routes);
        let row = sample_row(&ctx, WebVital::Lcp, &s);
        assert_eq!(row.replay, Cell::NoValue);
        assert_eq!(row.profile, Cell::NoValue);
        assert_eq!(row.web_vital, Cell::NoValue);
        assert_eq!(row.score, Cell::Empty);

        // Replay without a known duration has no link either
        let mut s = scored(3, Some(100.0));
        s.sample.duration_ms = None;
        let row = sample_row(&ctx, WebVital::Lcp, &s);
        assert_eq!(row.replay.text(), NO_VALUE);
    }

    #[test]
    fn project_slug_falls_back_to_row() {
        let routes = routes();
        let ctx = ViewContext::new(&routes);
        let row = sample_row(&ctx, WebVital::Lcp, &scored(4, Some(100.0)));
        assert!(matches!(
            &row.transaction,
            Cell::Link { href, .. } if href.contains("/performance/storefront:")
        ));
    }

    #[test]
    fn table_headers_name_the_vital() {
        let routes = routes();
        let ctx = ViewContext::new(&routes);
        let table = sample_table(&ctx, Some(WebVital::Fcp), &MergedSamples::default());
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Transaction", "Replay", "Profile", "fcp", "fcp Score"]);
        assert_eq!(table.sort.key, "score");
        assert!(table.rows.is_empty());
    }

    #[test]
    fn series_follows_the_selected_vital() {
        let timeseries = VitalTimeseries {
            interval_secs: 3600,
            series: VitalValues::from_fn(|vital| {
                vec![SeriesPoint {
                    name: "2023-11-14T22:00:00Z".to_string(),
                    value: Some(if vital == WebVital::Cls { 0.1 } else { 100.0 }),
                }]
            }),
        };
        let series = line_series(Some(WebVital::Cls), Some(&timeseries));
        assert_eq!(series.series_name, "cls");
        assert_eq!(series.points[0].value, Some(0.1));

        assert_eq!(line_series(None, Some(&timeseries)), LineSeries::default());
        assert!(line_series(Some(WebVital::Lcp), None).points.is_empty());
    }
}

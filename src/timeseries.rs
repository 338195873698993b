use crate::models::CohortPoint;

pub const MANY_POINTS_THRESHOLD: usize = 50;
pub const DECIMATION_SAMPLES: usize = 200;
pub const MIN_CHART_HEIGHT: u32 = 280;
pub const MAX_CHART_HEIGHT: u32 = 1200;
const HEIGHT_PER_POINT: f64 = 6.0;
const HEIGHT_BASE: u32 = 120;
const DEFAULT_POINT_RADIUS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimationAlgorithm {
    /// Largest-triangle-three-buckets.
    Lttb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimation {
    pub algorithm: DecimationAlgorithm,
    pub samples: usize,
}

/// Presentation hints for the chart renderer. None of these alter the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderHints {
    pub many_points: bool,
    pub point_radius: u32,
    pub point_hover_radius: u32,
    pub decimation: Option<Decimation>,
    pub suggested_height: u32,
}

impl RenderHints {
    pub fn for_point_count(count: usize) -> Self {
        let many_points = count > MANY_POINTS_THRESHOLD;
        let point_radius = if many_points { 0 } else { DEFAULT_POINT_RADIUS };
        RenderHints {
            many_points,
            point_radius,
            point_hover_radius: (point_radius + 2).max(4),
            decimation: many_points.then_some(Decimation {
                algorithm: DecimationAlgorithm::Lttb,
                samples: DECIMATION_SAMPLES,
            }),
            suggested_height: suggested_height(count),
        }
    }
}

pub fn suggested_height(count: usize) -> u32 {
    let calculated = ((count as f64 * HEIGHT_PER_POINT).ceil() as u32).saturating_add(HEIGHT_BASE);
    calculated.clamp(MIN_CHART_HEIGHT, MAX_CHART_HEIGHT)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortSeries {
    pub years: Vec<i64>,
    pub labels: Vec<String>,
    pub mean: Vec<Option<f64>>,
    pub median: Vec<Option<f64>>,
    pub counts: Vec<i64>,
    pub hints: RenderHints,
}

impl CohortSeries {
    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CohortSeriesOutcome {
    /// Nothing to plot; the caller should skip rendering.
    NoData,
    Series(CohortSeries),
}

/// Orders points by cohort year (the feed is not assumed sorted) and splits
/// them into the parallel series the chart consumes.
pub fn build(points: &[CohortPoint]) -> CohortSeriesOutcome {
    if points.is_empty() {
        return CohortSeriesOutcome::NoData;
    }

    let mut ordered: Vec<&CohortPoint> = points.iter().collect();
    ordered.sort_by_key(|p| p.cohort_year);

    CohortSeriesOutcome::Series(CohortSeries {
        years: ordered.iter().map(|p| p.cohort_year).collect(),
        labels: ordered.iter().map(|p| p.cohort_year.to_string()).collect(),
        mean: ordered.iter().map(|p| p.mean).collect(),
        median: ordered.iter().map(|p| p.median).collect(),
        counts: ordered.iter().map(|p| p.count.unwrap_or(0)).collect(),
        hints: RenderHints::for_point_count(ordered.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn point(year: i64) -> CohortPoint {
        CohortPoint {
            cohort_year: year,
            mean: Some(3.0),
            median: Some(3.1),
            count: Some(10),
        }
    }

    fn series(points: &[CohortPoint]) -> CohortSeries {
        match build(points) {
            CohortSeriesOutcome::Series(series) => series,
            CohortSeriesOutcome::NoData => panic!("expected a series"),
        }
    }

    #[test]
    fn empty_input_signals_no_data() {
        assert_eq!(build(&[]), CohortSeriesOutcome::NoData);
    }

    #[test]
    fn labels_are_chronological() {
        let built = series(&[point(2022), point(2021), point(2023)]);
        assert_eq!(built.labels, vec!["2021", "2022", "2023"]);
        assert_eq!(built.counts, vec![10, 10, 10]);
    }

    #[test]
    fn missing_count_defaults_to_zero() {
        let mut sparse = point(2020);
        sparse.count = None;
        sparse.mean = None;
        let built = series(&[sparse]);
        assert_eq!(built.counts, vec![0]);
        assert_eq!(built.mean, vec![None]);
    }

    #[test]
    fn small_series_keep_markers() {
        let hints = RenderHints::for_point_count(50);
        assert!(!hints.many_points);
        assert_eq!(hints.point_radius, 3);
        assert_eq!(hints.point_hover_radius, 5);
        assert_eq!(hints.decimation, None);
    }

    #[test]
    fn dense_series_request_decimation() {
        let hints = RenderHints::for_point_count(51);
        assert!(hints.many_points);
        assert_eq!(hints.point_radius, 0);
        assert_eq!(hints.point_hover_radius, 4);
        assert_eq!(
            hints.decimation,
            Some(Decimation {
                algorithm: DecimationAlgorithm::Lttb,
                samples: 200
            })
        );
    }

    #[test]
    fn height_is_clamped() {
        assert_eq!(suggested_height(0), 280);
        assert_eq!(suggested_height(30), 300);
        assert_eq!(suggested_height(100), 720);
        assert_eq!(suggested_height(500), 1200);
        assert_eq!(suggested_height(usize::MAX), 1200);
    }

    proptest! {
        #[test]
        fn output_years_never_decrease(years in prop::collection::vec(1990i64..2030, 1..80)) {
            let points: Vec<_> = years.iter().map(|y| point(*y)).collect();
            let built = series(&points);
            prop_assert!(built.years.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(built.len(), years.len());
        }
    }
}

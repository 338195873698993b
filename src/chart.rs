use std::collections::HashSet;
use std::fmt::Write;

use thiserror::Error;
use tracing::warn;

use crate::pipeline::fixed_or;
use crate::timeseries::{CohortSeries, DecimationAlgorithm};

const BAR_WIDTH: usize = 30;
const GPA_SCALE_MAX: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BarChartSpec {
    pub title: String,
    pub labels: Vec<String>,
    /// Percentages, 0 to 100.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartSpec {
    CohortLine(CohortSeries),
    HorizontalBar(BarChartSpec),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChartError {
    #[error("chart {0} is not live on this backend")]
    NotLive(u64),
    #[error("bar chart has {labels} labels but {values} values")]
    MismatchedBars { labels: usize, values: usize },
}

/// Constructs and tears down charts for a rendering surface.
pub trait ChartBackend {
    type Chart;
    type Error: std::fmt::Display;

    fn construct(&mut self, spec: &ChartSpec) -> Result<Self::Chart, Self::Error>;
    fn destroy(&mut self, chart: Self::Chart) -> Result<(), Self::Error>;
}

/// Owns the single live chart bound to one surface. The previous chart is
/// always released before a replacement is constructed.
pub struct ChartSurface<B: ChartBackend> {
    name: String,
    backend: B,
    live: Option<B::Chart>,
}

impl<B: ChartBackend> ChartSurface<B> {
    pub fn new(name: impl Into<String>, backend: B) -> Self {
        Self {
            name: name.into(),
            backend,
            live: None,
        }
    }

    pub fn replace(&mut self, spec: &ChartSpec) -> Result<&B::Chart, B::Error> {
        self.release();
        let chart = self.backend.construct(spec)?;
        Ok(&*self.live.insert(chart))
    }

    /// Idempotent. A failed teardown is logged and the chart is forgotten.
    pub fn release(&mut self) {
        if let Some(chart) = self.live.take() {
            if let Err(err) = self.backend.destroy(chart) {
                warn!(surface = %self.name, error = %err, "failed to destroy previous chart");
            }
        }
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&B::Chart> {
        self.live.as_ref()
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: ChartBackend> Drop for ChartSurface<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChart {
    pub id: u64,
    pub text: String,
}

/// Renders charts as markdown text for the terminal and reports.
#[derive(Debug, Default)]
pub struct TextChartBackend {
    next_id: u64,
    live: HashSet<u64>,
}

#[cfg(test)]
impl TextChartBackend {
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl ChartBackend for TextChartBackend {
    type Chart = TextChart;
    type Error = ChartError;

    fn construct(&mut self, spec: &ChartSpec) -> Result<TextChart, ChartError> {
        let text = match spec {
            ChartSpec::CohortLine(series) => render_cohort_line(series),
            ChartSpec::HorizontalBar(bars) => render_bars(bars)?,
        };
        self.next_id += 1;
        self.live.insert(self.next_id);
        Ok(TextChart {
            id: self.next_id,
            text,
        })
    }

    fn destroy(&mut self, chart: TextChart) -> Result<(), ChartError> {
        if self.live.remove(&chart.id) {
            Ok(())
        } else {
            Err(ChartError::NotLive(chart.id))
        }
    }
}

fn render_cohort_line(series: &CohortSeries) -> String {
    let hints = series.hints;
    let rows: Vec<usize> = match hints.decimation {
        Some(decimation) if decimation.algorithm == DecimationAlgorithm::Lttb => {
            let means: Vec<f64> = series.mean.iter().map(|m| m.unwrap_or(0.0)).collect();
            lttb(&means, decimation.samples)
        }
        _ => (0..series.len()).collect(),
    };
    let marker = if hints.point_radius > 0 { "●" } else { "" };

    let mut output = String::new();
    let _ = writeln!(
        output,
        "_{} cohorts, suggested height {}px{}_",
        series.len(),
        hints.suggested_height,
        if rows.len() < series.len() {
            format!(", decimated to {} samples", rows.len())
        } else {
            String::new()
        }
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "| Cohort | Mean GPA | Median GPA | n | Trend |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for index in rows {
        let mean = series.mean[index];
        let filled = scaled(mean.unwrap_or(0.0), GPA_SCALE_MAX);
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {}{} |",
            series.labels[index],
            fixed_or(mean, 2, "n/a"),
            fixed_or(series.median[index], 2, "n/a"),
            series.counts[index],
            "█".repeat(filled),
            marker
        );
    }
    output
}

fn render_bars(spec: &BarChartSpec) -> Result<String, ChartError> {
    if spec.labels.len() != spec.values.len() {
        return Err(ChartError::MismatchedBars {
            labels: spec.labels.len(),
            values: spec.values.len(),
        });
    }
    let label_width = spec.labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let mut output = String::new();
    let _ = writeln!(output, "{}", spec.title);
    for (label, value) in spec.labels.iter().zip(&spec.values) {
        let filled = scaled(*value, 100.0);
        let _ = writeln!(
            output,
            "{:<width$} {}{} {:.1}%",
            label,
            "█".repeat(filled),
            "░".repeat(BAR_WIDTH - filled),
            value,
            width = label_width
        );
    }
    Ok(output)
}

fn scaled(value: f64, max: f64) -> usize {
    if !value.is_finite() || max <= 0.0 {
        return 0;
    }
    ((value / max).clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize
}

/// Largest-triangle-three-buckets downsampling over `(index, value)` points.
/// Returns the kept indices in ascending order; first and last are always kept.
pub fn lttb(values: &[f64], threshold: usize) -> Vec<usize> {
    let n = values.len();
    if threshold >= n || threshold < 3 {
        return (0..n).collect();
    }

    let bucket = (n - 2) as f64 / (threshold - 2) as f64;
    let mut selected = Vec::with_capacity(threshold);
    selected.push(0);
    let mut anchor = 0usize;

    for i in 0..threshold - 2 {
        let avg_start = ((i + 1) as f64 * bucket).floor() as usize + 1;
        let avg_end = (((i + 2) as f64 * bucket).floor() as usize + 1).min(n);
        let (avg_x, avg_y) = if avg_start < avg_end {
            let len = (avg_end - avg_start) as f64;
            let sum_x: f64 = (avg_start..avg_end).map(|j| j as f64).sum();
            let sum_y: f64 = values[avg_start..avg_end].iter().sum();
            (sum_x / len, sum_y / len)
        } else {
            ((n - 1) as f64, values[n - 1])
        };

        let range_start = (i as f64 * bucket).floor() as usize + 1;
        let range_end = (((i + 1) as f64 * bucket).floor() as usize + 1).min(n - 1);
        let (ax, ay) = (anchor as f64, values[anchor]);

        let mut best = range_start;
        let mut best_area = -1.0;
        for j in range_start..range_end {
            let area = ((ax - avg_x) * (values[j] - ay) - (ax - j as f64) * (avg_y - ay)).abs();
            if area > best_area {
                best_area = area;
                best = j;
            }
        }
        selected.push(best);
        anchor = best;
    }

    selected.push(n - 1);
    selected
}

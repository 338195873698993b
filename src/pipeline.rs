use std::cmp::Ordering;

use serde::Serialize;

use crate::models::{CourseCatalogRow, JoinedRiskRow, StudentSummaryRecord};

/// Fields the filters and comparators look at.
pub trait PipelineRow {
    fn student_id(&self) -> &str;
    fn major(&self) -> Option<&str>;
    fn cohort_year(&self) -> Option<i64>;
    fn gpa(&self) -> Option<f64>;
    fn risk_score(&self) -> Option<f64>;
}

impl PipelineRow for StudentSummaryRecord {
    fn student_id(&self) -> &str {
        &self.student_id
    }

    fn major(&self) -> Option<&str> {
        self.major.as_deref()
    }

    fn cohort_year(&self) -> Option<i64> {
        self.cohort_year
    }

    fn gpa(&self) -> Option<f64> {
        self.gpa
    }

    fn risk_score(&self) -> Option<f64> {
        None
    }
}

impl PipelineRow for JoinedRiskRow {
    fn student_id(&self) -> &str {
        &self.student.student_id
    }

    fn major(&self) -> Option<&str> {
        self.student.major.as_deref()
    }

    fn cohort_year(&self) -> Option<i64> {
        self.student.cohort_year
    }

    fn gpa(&self) -> Option<f64> {
        self.student.gpa
    }

    fn risk_score(&self) -> Option<f64> {
        self.score
    }
}

/// Optional, conjunctive row filters. Blank inputs are treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilters {
    major: Option<String>,
    cohort_year: Option<String>,
    student_id_contains: Option<String>,
}

impl RowFilters {
    pub fn new(major: Option<&str>, cohort_year: Option<&str>, student_id: Option<&str>) -> Self {
        Self::default()
            .with_major(major)
            .with_cohort_year(cohort_year)
            .with_student_id_contains(student_id)
    }

    pub fn with_major(mut self, major: Option<&str>) -> Self {
        self.major = non_blank(major).map(str::to_string);
        self
    }

    pub fn with_cohort_year(mut self, cohort_year: Option<&str>) -> Self {
        self.cohort_year = non_blank(cohort_year).map(normalize_cohort);
        self
    }

    pub fn with_student_id_contains(mut self, needle: Option<&str>) -> Self {
        self.student_id_contains = non_blank(needle).map(str::to_lowercase);
        self
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.major.is_none() && self.cohort_year.is_none() && self.student_id_contains.is_none()
    }

    pub fn matches<R: PipelineRow>(&self, row: &R) -> bool {
        if let Some(major) = &self.major {
            if row.major() != Some(major.as_str()) {
                return false;
            }
        }
        if let Some(cohort) = &self.cohort_year {
            match row.cohort_year() {
                Some(year) if year.to_string() == *cohort => {}
                _ => return false,
            }
        }
        if let Some(needle) = &self.student_id_contains {
            if !row.student_id().to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `" 2023.0 "` and `"2023"` both normalise to `"2023"`.
pub fn normalize_cohort(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => format!("{}", value as i64),
        _ => trimmed.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// At-risk roster. Missing scores compare as 0.
    RiskScoreDesc,
    /// Leaderboard. Missing GPA compares as 0.
    GpaDesc,
    /// Trend view. Rows without a cohort go last.
    CohortYearAsc,
}

impl SortOrder {
    pub fn compare<R: PipelineRow>(self, a: &R, b: &R) -> Ordering {
        match self {
            SortOrder::RiskScoreDesc => {
                let (a, b) = (a.risk_score().unwrap_or(0.0), b.risk_score().unwrap_or(0.0));
                b.partial_cmp(&a).unwrap_or(Ordering::Equal)
            }
            SortOrder::GpaDesc => {
                let (a, b) = (a.gpa().unwrap_or(0.0), b.gpa().unwrap_or(0.0));
                b.partial_cmp(&a).unwrap_or(Ordering::Equal)
            }
            SortOrder::CohortYearAsc => a
                .cohort_year()
                .unwrap_or(i64::MAX)
                .cmp(&b.cohort_year().unwrap_or(i64::MAX)),
        }
    }
}

/// Filters then stably sorts. Inputs are left untouched; an empty result is a
/// normal outcome.
pub fn process<R: PipelineRow + Clone>(rows: &[R], filters: &RowFilters, order: SortOrder) -> Vec<R> {
    let mut selected: Vec<R> = rows.iter().filter(|row| filters.matches(*row)).cloned().collect();
    selected.sort_by(|a, b| order.compare(a, b));
    selected
}

pub fn fixed_or(value: Option<f64>, precision: usize, fallback: &str) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{v:.precision$}"),
        _ => fallback.to_string(),
    }
}

pub fn format_gpa(gpa: Option<f64>) -> String {
    fixed_or(gpa, 2, "n/a")
}

/// Attendance and credits.
pub fn format_tenths(value: Option<f64>) -> String {
    fixed_or(value, 1, "0.0")
}

pub fn format_percent(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub student_id: String,
    pub name: String,
    pub major: String,
    pub cohort_year: String,
    pub gpa: String,
    pub total_credits: String,
    pub avg_attendance: String,
    pub dfw_count: i64,
    pub credits_attempted: String,
}

impl From<&StudentSummaryRecord> for LeaderboardRow {
    fn from(record: &StudentSummaryRecord) -> Self {
        LeaderboardRow {
            student_id: record.student_id.clone(),
            name: record.name.clone().unwrap_or_default(),
            major: record.major.clone().unwrap_or_default(),
            cohort_year: record.cohort_year.map(|y| y.to_string()).unwrap_or_default(),
            gpa: format_gpa(record.gpa),
            total_credits: format_tenths(record.total_credits),
            avg_attendance: format_tenths(record.avg_attendance),
            dfw_count: record.dfw_count.unwrap_or(0),
            credits_attempted: format_tenths(record.credits_attempted),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtRiskRow {
    pub student_id: String,
    pub name: String,
    pub major: String,
    pub cohort_year: String,
    pub gpa: String,
    pub avg_attendance: String,
    pub dfw_count: i64,
    pub credits_attempted: String,
    pub score: String,
    pub flags: String,
    pub risk_class: String,
}

impl From<&JoinedRiskRow> for AtRiskRow {
    fn from(row: &JoinedRiskRow) -> Self {
        let student = &row.student;
        AtRiskRow {
            student_id: student.student_id.clone(),
            name: student.display_name().to_string(),
            major: student.major.clone().unwrap_or_default(),
            cohort_year: student.cohort_year.map(|y| y.to_string()).unwrap_or_default(),
            gpa: format_gpa(student.gpa),
            avg_attendance: format_tenths(student.avg_attendance),
            dfw_count: student.dfw_count.unwrap_or(0),
            credits_attempted: format_tenths(student.credits_attempted),
            score: row.score_display.clone(),
            flags: row.flags.join(", "),
            risk_class: row.risk.css_class().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseRow {
    pub course_id: String,
    pub title: String,
    pub department: String,
    pub level: String,
    pub pass_rate: String,
    pub dfw_rate: String,
    pub prerequisites: String,
}

impl From<&CourseCatalogRow> for CourseRow {
    fn from(row: &CourseCatalogRow) -> Self {
        let course = &row.course;
        CourseRow {
            course_id: course.course_id.clone(),
            title: course.title.clone(),
            department: course.department.clone(),
            level: course.level.map(|l| l.to_string()).unwrap_or_default(),
            pass_rate: format_percent(course.pass_rate),
            dfw_rate: format_percent(course.dfw_rate),
            prerequisites: row
                .prerequisites
                .iter()
                .map(|p| p.course_id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Leaderboard rows, by GPA unless another order is asked for.
pub fn leaderboard_rows(
    summary: &[StudentSummaryRecord],
    filters: &RowFilters,
    order: SortOrder,
) -> Vec<LeaderboardRow> {
    process(summary, filters, order)
        .iter()
        .map(LeaderboardRow::from)
        .collect()
}

pub fn at_risk_rows(joined: &[JoinedRiskRow], filters: &RowFilters, order: SortOrder) -> Vec<AtRiskRow> {
    process(joined, filters, order)
        .iter()
        .map(AtRiskRow::from)
        .collect()
}

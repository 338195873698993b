use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::chart::{ChartSpec, ChartSurface, TextChartBackend};
use crate::models::PrerequisiteEntry;
use crate::pipeline::{format_gpa, format_tenths, AtRiskRow, CourseRow, LeaderboardRow};
use crate::timeseries::CohortSeries;
use crate::views::{self, CourseCatalog, Dashboard, OverviewKpis, StudentDetail, ViewState};

/// Rows shown per table in the printed report.
pub const REPORT_ROWS: usize = 10;

pub type TextSurface = ChartSurface<TextChartBackend>;

pub fn text_surface(name: &str) -> TextSurface {
    ChartSurface::new(name, TextChartBackend::default())
}

fn write_state<T>(output: &mut String, state: &ViewState<T>, body: impl FnOnce(&mut String, &T)) {
    match state {
        ViewState::Loaded(value) => body(output, value),
        ViewState::Empty(message) => {
            let _ = writeln!(output, "{message}");
        }
        ViewState::Failed(message) => {
            let _ = writeln!(output, "Failed to load: {message}");
        }
    }
}

fn write_chart(output: &mut String, surface: &mut TextSurface, spec: &ChartSpec) {
    match surface.replace(spec) {
        Ok(chart) => {
            let _ = write!(output, "{}", chart.text);
        }
        Err(err) => {
            let _ = writeln!(output, "Chart unavailable: {err}");
        }
    }
}

pub fn render_kpis(state: &ViewState<OverviewKpis>) -> String {
    let mut output = String::new();
    write_state(&mut output, state, |output, kpis| {
        let _ = writeln!(output, "- Total students: {}", kpis.total_students);
        let _ = writeln!(output, "- Average GPA: {}", kpis.avg_gpa);
        let _ = writeln!(output, "- At-risk students: {}", kpis.at_risk);
    });
    output
}

pub fn render_leaderboard(state: &ViewState<Vec<LeaderboardRow>>, limit: Option<usize>) -> String {
    let mut output = String::new();
    write_state(&mut output, state, |output, rows| {
        let _ = writeln!(
            output,
            "| ID | Name | Major | Cohort | GPA | Credits | Attendance | DFW | Attempted |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|");
        for row in rows.iter().take(limit.unwrap_or(rows.len())) {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                row.student_id,
                row.name,
                row.major,
                row.cohort_year,
                row.gpa,
                row.total_credits,
                row.avg_attendance,
                row.dfw_count,
                row.credits_attempted
            );
        }
    });
    output
}

pub fn render_at_risk(state: &ViewState<Vec<AtRiskRow>>, limit: Option<usize>) -> String {
    let mut output = String::new();
    write_state(&mut output, state, |output, rows| {
        let _ = writeln!(
            output,
            "| ID | Name | Major | Cohort | GPA | Attendance | DFW | Attempted | Risk | Flags |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|");
        for row in rows.iter().take(limit.unwrap_or(rows.len())) {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
                row.student_id,
                row.name,
                row.major,
                row.cohort_year,
                row.gpa,
                row.avg_attendance,
                row.dfw_count,
                row.credits_attempted,
                row.score,
                row.flags
            );
        }
    });
    output
}

pub fn render_cohort(state: &ViewState<CohortSeries>, surface: &mut TextSurface) -> String {
    let mut output = String::new();
    write_state(&mut output, state, |output, series| {
        write_chart(output, surface, &ChartSpec::CohortLine(series.clone()));
    });
    output
}

pub fn render_courses(
    catalog: &CourseCatalog,
    pass_surface: &mut TextSurface,
    dfw_surface: &mut TextSurface,
) -> String {
    let mut output = String::new();
    if catalog.prerequisites.is_failed() {
        let _ = writeln!(output, "{}", views::PREREQUISITES_UNAVAILABLE);
    }
    write_state(&mut output, &catalog.courses, |output, rows| {
        let _ = writeln!(output, "| Course | Title | Department | Level | Pass | DFW | Prerequisites |");
        let _ = writeln!(output, "|---|---|---|---|---|---|---|");
        for row in rows.iter().map(CourseRow::from) {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} |",
                row.course_id,
                row.title,
                row.department,
                row.level,
                row.pass_rate,
                row.dfw_rate,
                row.prerequisites
            );
        }
        let [pass, dfw] = views::course_rate_charts(rows);
        let _ = writeln!(output);
        write_chart(output, pass_surface, &pass);
        let _ = writeln!(output);
        write_chart(output, dfw_surface, &dfw);
    });
    output
}

fn prerequisite_count(entry: &PrerequisiteEntry) -> String {
    match entry.prerequisites.len() {
        0 => "No prerequisites".to_string(),
        n => format!("{n} prereq(s)"),
    }
}

pub fn render_prerequisites(state: &ViewState<Vec<PrerequisiteEntry>>) -> String {
    let mut output = String::new();
    write_state(&mut output, state, |output, entries| {
        for entry in entries {
            let heading = match entry.title.as_deref() {
                Some(title) if !title.is_empty() => format!("{} {}", entry.course_id, title),
                _ => entry.course_id.clone(),
            };
            let _ = writeln!(output, "- {} ({})", heading, prerequisite_count(entry));
            for prereq in &entry.prerequisites {
                match prereq.title.as_deref() {
                    Some(title) => {
                        let _ = writeln!(output, "  - {} {}", prereq.course_id, title);
                    }
                    None => {
                        let _ = writeln!(output, "  - {}", prereq.course_id);
                    }
                }
            }
        }
    });
    output
}

/// Enrollment grades and attendance are percentages, shown as received.
fn raw_or_blank(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn render_student(state: &ViewState<StudentDetail>) -> String {
    let mut output = String::new();
    write_state(&mut output, state, |output, detail| {
        let _ = writeln!(output, "# {} ({})", detail.name, detail.student_id);
        if let Some(summary) = &detail.summary {
            let _ = writeln!(
                output,
                "Major {} | Cohort {} | GPA {} | Credits {}",
                summary.major.as_deref().unwrap_or("n/a"),
                summary
                    .cohort_year
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
                format_gpa(summary.gpa),
                format_tenths(summary.total_credits)
            );
            let _ = writeln!(
                output,
                "Attendance {} | DFW courses {} | Credits attempted {}",
                format_tenths(summary.avg_attendance),
                summary.dfw_count.unwrap_or(0),
                format_tenths(summary.credits_attempted)
            );
        }
        let _ = writeln!(output);
        if detail.enrollments.is_empty() {
            let _ = writeln!(output, "No enrollments found.");
            return;
        }
        let _ = writeln!(output, "| Term | Course | Title | Grade | Attendance |");
        let _ = writeln!(output, "|---|---|---|---|---|");
        for enrollment in &detail.enrollments {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} |",
                enrollment.term.as_deref().unwrap_or(""),
                enrollment.course_id,
                enrollment.title.as_deref().unwrap_or(""),
                raw_or_blank(enrollment.grade),
                raw_or_blank(enrollment.attendance_pct)
            );
        }
    });
    output
}

pub fn build_report(
    dashboard: &Dashboard,
    generated_at: DateTime<Utc>,
    cohort_surface: &mut TextSurface,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Success Dashboard");
    let _ = writeln!(output, "Generated {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    output.push_str(&render_kpis(&dashboard.kpis));

    let _ = writeln!(output);
    let _ = writeln!(output, "## GPA Leaderboard");
    output.push_str(&render_leaderboard(&dashboard.leaderboard, Some(REPORT_ROWS)));

    let _ = writeln!(output);
    let _ = writeln!(output, "## At-Risk Students");
    output.push_str(&render_at_risk(&dashboard.at_risk, Some(REPORT_ROWS)));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Cohort GPA Trend");
    output.push_str(&render_cohort(&dashboard.cohort, cohort_surface));

    output
}

use tracing::{error, info};

use crate::chart::{BarChartSpec, ChartSpec};
use crate::client::{CourseQuery, FetchError, MetricsClient};
use crate::join;
use crate::models::{CourseCatalogRow, Enrollment, PrerequisiteEntry, StudentSummaryRecord};
use crate::pipeline::{self, AtRiskRow, LeaderboardRow, RowFilters, SortOrder};
use crate::timeseries::{self, CohortSeries, CohortSeriesOutcome};

pub const NO_GPA_DATA: &str = "No GPA data available.";
pub const NO_AT_RISK: &str = "No at-risk students for selected filters.";
pub const NO_COHORT_DATA: &str = "No cohort GPA data to display.";
pub const NO_COURSE_DATA: &str = "No course data for selected filters.";
pub const NO_PREREQUISITES: &str = "No courses found.";
pub const PREREQUISITES_UNAVAILABLE: &str = "Could not load course prerequisites.";

/// What a view's display region shows. `Empty` is a successful load with
/// nothing to list; `Failed` means the view's data could not be fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loaded(T),
    Empty(String),
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            ViewState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ViewState::Failed(_))
    }
}

fn settle<T>(
    view: &'static str,
    result: Result<T, FetchError>,
    is_empty: impl Fn(&T) -> bool,
    empty_message: impl Into<String>,
) -> ViewState<T> {
    match result {
        Ok(value) if is_empty(&value) => ViewState::Empty(empty_message.into()),
        Ok(value) => {
            info!(view, "view loaded");
            ViewState::Loaded(value)
        }
        Err(err) => {
            error!(
                view,
                url = err.url().unwrap_or_default(),
                status = err.status(),
                body = err.body().unwrap_or_default(),
                error = %err,
                "failed to load view"
            );
            ViewState::Failed(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewKpis {
    pub total_students: usize,
    /// Mean GPA with missing values counted as 0, two decimals.
    pub avg_gpa: String,
    pub at_risk: usize,
}

pub fn compute_kpis(summary: &[StudentSummaryRecord], at_risk_count: usize) -> OverviewKpis {
    let total_students = summary.len();
    let avg_gpa = if total_students > 0 {
        summary.iter().map(|r| r.gpa.unwrap_or(0.0)).sum::<f64>() / total_students as f64
    } else {
        0.0
    };
    OverviewKpis {
        total_students,
        avg_gpa: format!("{avg_gpa:.2}"),
        at_risk: at_risk_count,
    }
}

pub async fn overview_kpis(client: &MetricsClient) -> ViewState<OverviewKpis> {
    let result = async {
        let (summary, risk) = tokio::try_join!(client.student_summary(), client.at_risk())?;
        Ok::<_, FetchError>(compute_kpis(&summary, risk.len()))
    }
    .await;
    settle("overview_kpis", result, |_| false, "")
}

pub async fn gpa_leaderboard(
    client: &MetricsClient,
    filters: &RowFilters,
    order: SortOrder,
) -> ViewState<Vec<LeaderboardRow>> {
    let result = client
        .student_summary()
        .await
        .map(|summary| pipeline::leaderboard_rows(&summary, filters, order));
    settle("gpa_leaderboard", result, Vec::is_empty, NO_GPA_DATA)
}

pub async fn at_risk_roster(
    client: &MetricsClient,
    filters: &RowFilters,
    order: SortOrder,
) -> ViewState<Vec<AtRiskRow>> {
    let result = async {
        let (summary, risk) = tokio::try_join!(client.student_summary(), client.at_risk())?;
        let joined = join::join_at_risk(&summary, &risk);
        Ok::<_, FetchError>(pipeline::at_risk_rows(&joined, filters, order))
    }
    .await;
    settle("at_risk_roster", result, Vec::is_empty, NO_AT_RISK)
}

pub async fn cohort_trend(client: &MetricsClient) -> ViewState<CohortSeries> {
    match client.cohort_gpa().await.map(|points| timeseries::build(&points)) {
        Ok(CohortSeriesOutcome::NoData) => ViewState::Empty(NO_COHORT_DATA.to_string()),
        Ok(CohortSeriesOutcome::Series(series)) => settle("cohort_trend", Ok(series), |_| false, ""),
        Err(err) => settle("cohort_trend", Err(err), |_| false, ""),
    }
}

/// Course rates and the prerequisite feed settle separately. When the
/// prerequisite feed fails the rates are still shown, without prerequisites.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseCatalog {
    pub courses: ViewState<Vec<CourseCatalogRow>>,
    pub prerequisites: ViewState<Vec<PrerequisiteEntry>>,
}

pub async fn course_catalog(client: &MetricsClient, query: &CourseQuery) -> CourseCatalog {
    let rates = async {
        let (pass, dfw) = tokio::try_join!(client.pass_rates(query), client.dfw_rates(query))?;
        Ok::<_, FetchError>(join::join_course_rates(&pass, &dfw))
    };
    let (rates, prerequisites) = tokio::join!(rates, client.prerequisites_full());

    let prerequisites = settle("course_prerequisites", prerequisites, |_| false, "");
    let known = prerequisites.loaded().map(Vec::as_slice).unwrap_or_default();
    let courses = rates.map(|courses| join::join_prerequisites(&courses, known));

    CourseCatalog {
        courses: settle("course_catalog", courses, Vec::is_empty, NO_COURSE_DATA),
        prerequisites,
    }
}

/// Pass-rate and DFW-rate bar charts, in that order.
pub fn course_rate_charts(rows: &[CourseCatalogRow]) -> [ChartSpec; 2] {
    let labels: Vec<String> = rows
        .iter()
        .map(|row| format!("{} {}", row.course.course_id, row.course.title).trim_end().to_string())
        .collect();
    let bars = |title: &str, rate: fn(&CourseCatalogRow) -> f64| {
        ChartSpec::HorizontalBar(BarChartSpec {
            title: title.to_string(),
            labels: labels.clone(),
            values: rows.iter().map(|row| rate(row) * 100.0).collect(),
        })
    };
    [
        bars("Pass rate (%)", |row| row.course.pass_rate),
        bars("DFW rate (%)", |row| row.course.dfw_rate),
    ]
}

pub async fn prerequisite_listing(client: &MetricsClient) -> ViewState<Vec<PrerequisiteEntry>> {
    let result = client.prerequisites_full().await.map(|mut entries| {
        entries.sort_by(|a, b| a.course_id.cmp(&b.course_id));
        entries
    });
    settle("prerequisite_listing", result, Vec::is_empty, NO_PREREQUISITES)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentDetail {
    pub student_id: String,
    pub name: String,
    pub summary: Option<StudentSummaryRecord>,
    pub enrollments: Vec<Enrollment>,
}

pub async fn student_detail(client: &MetricsClient, student_id: &str) -> ViewState<StudentDetail> {
    let result = async {
        let (summary, enrollments) = tokio::try_join!(
            client.student_summary(),
            client.student_enrollments(student_id)
        )?;
        let record = summary.into_iter().find(|r| r.student_id == student_id);
        let name = record
            .as_ref()
            .and_then(|r| r.name.clone())
            .or(enrollments.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| student_id.to_string());
        Ok::<_, FetchError>(StudentDetail {
            student_id: student_id.to_string(),
            name,
            summary: record,
            enrollments: enrollments.enrollments,
        })
    }
    .await;
    settle(
        "student_detail",
        result,
        |detail| detail.summary.is_none() && detail.enrollments.is_empty(),
        format!("No data found for student ID {student_id}."),
    )
}

/// The overview page: four views loaded concurrently, each settling on its own.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub kpis: ViewState<OverviewKpis>,
    pub leaderboard: ViewState<Vec<LeaderboardRow>>,
    pub at_risk: ViewState<Vec<AtRiskRow>>,
    pub cohort: ViewState<CohortSeries>,
}

pub async fn load_overview(client: &MetricsClient, filters: &RowFilters) -> Dashboard {
    let (kpis, leaderboard, at_risk, cohort) = tokio::join!(
        overview_kpis(client),
        gpa_leaderboard(client, filters, SortOrder::GpaDesc),
        at_risk_roster(client, filters, SortOrder::RiskScoreDesc),
        cohort_trend(client)
    );
    Dashboard {
        kpis,
        leaderboard,
        at_risk,
        cohort,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::client::{self, test_server};
    use crate::credentials::MemoryCredentialStore;

    async fn client_for(router: Router) -> MetricsClient {
        let base = test_server::serve(router).await;
        MetricsClient::new(
            base,
            Duration::from_secs(5),
            Arc::new(MemoryCredentialStore::default()),
        )
        .unwrap()
    }

    fn json_route(path: &str, body: Value) -> Router {
        Router::new().route(path, get(move || async move { Json(body) }))
    }

    #[test]
    fn kpis_count_missing_gpa_as_zero() {
        let summary = vec![
            StudentSummaryRecord {
                student_id: "S1".to_string(),
                gpa: Some(3.0),
                ..Default::default()
            },
            StudentSummaryRecord {
                student_id: "S2".to_string(),
                gpa: None,
                ..Default::default()
            },
        ];
        let kpis = compute_kpis(&summary, 1);
        assert_eq!(kpis.total_students, 2);
        assert_eq!(kpis.avg_gpa, "1.50");
        assert_eq!(compute_kpis(&[], 0).avg_gpa, "0.00");
    }

    #[tokio::test]
    async fn failed_endpoint_only_fails_dependent_views() {
        let router = json_route(
            client::STUDENT_SUMMARY_PATH,
            json!([{"student_id": "S1", "gpa": 3.5, "major": "CS", "cohort_year": 2023}]),
        )
        .merge(json_route(
            client::COHORT_GPA_PATH,
            json!([{"cohort_year": 2023, "mean": 3.5, "median": 3.5, "count": 1}]),
        ))
        .route(
            client::AT_RISK_PATH,
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "scoring failed") }),
        );
        let client = client_for(router).await;

        let dashboard = load_overview(&client, &RowFilters::default()).await;

        assert!(dashboard.kpis.is_failed());
        assert!(dashboard.at_risk.is_failed());
        let rows = dashboard.leaderboard.loaded().unwrap();
        assert_eq!(rows[0].gpa, "3.50");
        assert_eq!(dashboard.cohort.loaded().unwrap().labels, vec!["2023"]);
        match &dashboard.kpis {
            ViewState::Failed(message) => assert!(message.contains("500")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_risk_feed_is_empty_not_failed() {
        let router = json_route(
            client::STUDENT_SUMMARY_PATH,
            json!([{"student_id": "S1", "gpa": 3.5, "major": "CS", "cohort_year": 2023}]),
        )
        .merge(json_route(client::AT_RISK_PATH, json!([])))
        .merge(json_route(client::COHORT_GPA_PATH, json!([])));
        let client = client_for(router).await;

        let dashboard = load_overview(&client, &RowFilters::default()).await;

        assert_eq!(dashboard.at_risk, ViewState::Empty(NO_AT_RISK.to_string()));
        assert_eq!(dashboard.cohort, ViewState::Empty(NO_COHORT_DATA.to_string()));
        assert_eq!(dashboard.kpis.loaded().unwrap().at_risk, 0);
        assert_eq!(dashboard.leaderboard.loaded().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn roster_joins_and_classifies() {
        let router = json_route(
            client::STUDENT_SUMMARY_PATH,
            json!([{"student_id": "S1", "major": "CS", "cohort_year": 2023}]),
        )
        .merge(json_route(
            client::AT_RISK_PATH,
            json!([{"student_id": "S1", "score": 2.5, "flags": ["low-attendance"]}]),
        ));
        let client = client_for(router).await;

        let filters = RowFilters::default().with_cohort_year(Some("2023"));
        let roster = at_risk_roster(&client, &filters, SortOrder::RiskScoreDesc).await;
        let rows = roster.loaded().unwrap();
        assert_eq!(rows[0].score, "2.50 (High)");
        assert_eq!(rows[0].gpa, "n/a");
    }

    #[tokio::test]
    async fn course_catalog_fails_as_a_unit() {
        let router = json_route(
            client::PASS_RATES_PATH,
            json!([{"course_id": "CS101", "title": "Intro", "pass_rate": 0.9}]),
        )
        .merge(json_route(client::PREREQUISITES_PATH, json!([])))
        .route(
            client::DFW_RATES_PATH,
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream") }),
        );
        let client = client_for(router).await;

        let catalog = course_catalog(&client, &CourseQuery::default()).await;
        assert!(catalog.courses.is_failed());
        assert!(catalog.prerequisites.loaded().is_some());
    }

    #[tokio::test]
    async fn prerequisite_outage_keeps_course_rates() {
        let router = json_route(
            client::PASS_RATES_PATH,
            json!([{"course_id": "CS101", "title": "Intro", "pass_rate": 0.9}]),
        )
        .merge(json_route(
            client::DFW_RATES_PATH,
            json!([{"course_id": "CS101", "dfw_rate": 0.1}]),
        ))
        .route(
            client::PREREQUISITES_PATH,
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "graph down") }),
        );
        let client = client_for(router).await;

        let catalog = course_catalog(&client, &CourseQuery::default()).await;

        assert!(catalog.prerequisites.is_failed());
        let rows = catalog.courses.loaded().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].course.pass_rate, 0.9);
        assert!(rows[0].prerequisites.is_empty());
    }

    #[tokio::test]
    async fn course_catalog_defaults_missing_dfw_and_prerequisites() {
        let router = json_route(
            client::PASS_RATES_PATH,
            json!([
                {"course_id": "CS101", "title": "Intro", "pass_rate": 0.9},
                {"course_id": "CS201", "title": "Data Structures", "pass_rate": 0.75}
            ]),
        )
        .merge(json_route(
            client::DFW_RATES_PATH,
            json!([{"course_id": "CS201", "dfw_rate": 0.2}]),
        ))
        .merge(json_route(
            client::PREREQUISITES_PATH,
            json!([{"course_id": "CS201", "prerequisites": [{"course_id": "CS101"}]}]),
        ));
        let client = client_for(router).await;

        let catalog = course_catalog(&client, &CourseQuery::default()).await;
        let rows = catalog.courses.loaded().unwrap();
        assert_eq!(rows[0].course.dfw_rate, 0.0);
        assert!(rows[0].prerequisites.is_empty());
        assert_eq!(rows[1].prerequisites[0].course_id, "CS101");

        let [pass, dfw] = course_rate_charts(rows);
        match (pass, dfw) {
            (ChartSpec::HorizontalBar(pass), ChartSpec::HorizontalBar(dfw)) => {
                assert_eq!(pass.labels[0], "CS101 Intro");
                assert_eq!(pass.values, vec![90.0, 75.0]);
                assert_eq!(dfw.values, vec![0.0, 20.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn prerequisites_are_listed_by_course_id() {
        let router = json_route(
            client::PREREQUISITES_PATH,
            json!([
                {"course_id": "MATH201", "prerequisites": ["MATH101"]},
                {"course_id": "CS101", "title": "Intro", "prerequisites": []}
            ]),
        );
        let client = client_for(router).await;

        let listing = prerequisite_listing(&client).await;
        let ids: Vec<&str> = listing
            .loaded()
            .unwrap()
            .iter()
            .map(|e| e.course_id.as_str())
            .collect();
        assert_eq!(ids, vec!["CS101", "MATH201"]);
    }

    #[tokio::test]
    async fn unknown_student_reports_no_data() {
        let router = json_route(client::STUDENT_SUMMARY_PATH, json!([]))
            .route(
                "/api/students/{id}/enrollments",
                get(|| async { Json(json!({"name": null, "enrollments": []})) }),
            );
        let client = client_for(router).await;

        let detail = student_detail(&client, "S404").await;
        assert_eq!(
            detail,
            ViewState::Empty("No data found for student ID S404.".to_string())
        );
    }
}

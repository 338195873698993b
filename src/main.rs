use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chart;
mod client;
mod config;
mod credentials;
mod debounce;
mod export;
mod join;
mod models;
mod pipeline;
mod report;
mod risk;
mod timeseries;
mod views;

use client::{CourseQuery, MetricsClient};
use config::Config;
use credentials::{FileCredentialStore, LegacyCredentials, MigrationOutcome};
use debounce::DebounceTimer;
use pipeline::{CourseRow, RowFilters, SortOrder};
use views::ViewState;

#[derive(Parser)]
#[command(name = "student-success-dashboard")]
#[command(about = "Student success analytics from the metrics API", long_about = None)]
struct Cli {
    /// Base URL of the metrics API (overrides DASHBOARD_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Session file (overrides DASHBOARD_CREDENTIALS)
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// KPIs, leaderboard, at-risk roster and cohort trend
    Overview {
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        cohort: Option<String>,
    },
    /// Students ranked by GPA
    Leaderboard {
        /// Keep only student IDs containing this text
        #[arg(long)]
        student_id: Option<String>,
        /// Read filter text from stdin, one line per change
        #[arg(long, conflicts_with = "csv")]
        watch: bool,
        /// Order by cohort year, oldest first, instead of by GPA
        #[arg(long)]
        by_cohort: bool,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Students flagged by the risk model, highest score first
    AtRisk {
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        cohort: Option<String>,
        /// Order by cohort year, oldest first, instead of by risk score
        #[arg(long)]
        by_cohort: bool,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Mean and median GPA per cohort year
    Cohort,
    /// Course pass and DFW rates with prerequisites
    Courses {
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        term: Option<String>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Prerequisite graph, one course per line
    Prerequisites,
    /// Summary and enrollments for one student
    Student { id: String },
    /// Sign in and store the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// One-time import of a legacy key/value session dump
    ImportLegacy {
        #[arg(long)]
        from: PathBuf,
    },
    /// Generate a markdown dashboard report
    Report {
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        cohort: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?.with_overrides(cli.api_url.as_deref(), cli.credentials)?;
    let store = Arc::new(FileCredentialStore::new(&config.credentials_path));
    let client = MetricsClient::new(config.api_url.clone(), config.timeout, store.clone())
        .context("failed to build the HTTP client")?;

    match cli.command {
        Commands::Overview { major, cohort } => {
            let filters = RowFilters::new(major.as_deref(), cohort.as_deref(), None);
            let dashboard = views::load_overview(&client, &filters).await;
            let mut surface = report::text_surface("cohort");
            print!("{}", report::build_report(&dashboard, Utc::now(), &mut surface));
        }
        Commands::Leaderboard {
            student_id,
            watch,
            by_cohort,
            csv,
        } => {
            let order = sort_order(by_cohort, SortOrder::GpaDesc);
            if watch {
                watch_leaderboard(client, student_id, order).await;
            } else {
                let filters = RowFilters::new(None, None, student_id.as_deref());
                let state = views::gpa_leaderboard(&client, &filters, order).await;
                emit(&state, csv.as_deref(), |rows| rows.clone(), |s| {
                    report::render_leaderboard(s, None)
                })?;
            }
        }
        Commands::AtRisk {
            major,
            cohort,
            by_cohort,
            csv,
        } => {
            let filters = RowFilters::new(major.as_deref(), cohort.as_deref(), None);
            let order = sort_order(by_cohort, SortOrder::RiskScoreDesc);
            let state = views::at_risk_roster(&client, &filters, order).await;
            emit(&state, csv.as_deref(), |rows| rows.clone(), |s| {
                report::render_at_risk(s, None)
            })?;
        }
        Commands::Cohort => {
            let state = views::cohort_trend(&client).await;
            let mut surface = report::text_surface("cohort");
            print!("{}", report::render_cohort(&state, &mut surface));
        }
        Commands::Courses {
            department,
            term,
            csv,
        } => {
            let query = CourseQuery { department, term };
            let catalog = views::course_catalog(&client, &query).await;
            let mut pass_surface = report::text_surface("pass-rate");
            let mut dfw_surface = report::text_surface("dfw-rate");
            emit(
                &catalog.courses,
                csv.as_deref(),
                |rows| rows.iter().map(CourseRow::from).collect(),
                |_| report::render_courses(&catalog, &mut pass_surface, &mut dfw_surface),
            )?;
        }
        Commands::Prerequisites => {
            let state = views::prerequisite_listing(&client).await;
            print!("{}", report::render_prerequisites(&state));
        }
        Commands::Student { id } => {
            let state = views::student_detail(&client, id.trim()).await;
            print!("{}", report::render_student(&state));
        }
        Commands::Login { username, password } => {
            let session = client
                .login(&username, &password)
                .await
                .context("login failed")?;
            println!(
                "Signed in as {} ({}).",
                username,
                session.role.as_deref().unwrap_or("no role")
            );
        }
        Commands::Logout => {
            client.logout()?;
            println!("Signed out.");
        }
        Commands::Whoami => {
            let user = client
                .current_user()
                .await
                .context("failed to load the current user")?;
            println!("{} ({})", user.username, user.role.as_deref().unwrap_or("no role"));
        }
        Commands::ImportLegacy { from } => {
            let legacy = LegacyCredentials::from_path(&from)?;
            match credentials::import_legacy(&*store, legacy)? {
                MigrationOutcome::Imported => {
                    println!("Imported legacy session into {}.", store.path().display())
                }
                MigrationOutcome::AlreadyPresent => {
                    println!("A session is already stored; nothing imported.")
                }
                MigrationOutcome::NothingToImport => {
                    println!("No token found in {}.", from.display())
                }
            }
        }
        Commands::Report { major, cohort, out } => {
            let filters = RowFilters::new(major.as_deref(), cohort.as_deref(), None);
            let dashboard = views::load_overview(&client, &filters).await;
            let mut surface = report::text_surface("cohort");
            let report = report::build_report(&dashboard, Utc::now(), &mut surface);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Prints a view, or writes its rows to `csv` when a path is given.
fn emit<T, R: Serialize>(
    state: &ViewState<T>,
    csv: Option<&Path>,
    to_rows: impl FnOnce(&T) -> Vec<R>,
    render: impl FnOnce(&ViewState<T>) -> String,
) -> anyhow::Result<()> {
    match (csv, state.loaded()) {
        (Some(path), Some(value)) => {
            let written = export::write_csv_file(&to_rows(value), path)?;
            println!("Wrote {written} rows to {}.", path.display());
        }
        _ => print!("{}", render(state)),
    }
    Ok(())
}

fn sort_order(by_cohort: bool, default: SortOrder) -> SortOrder {
    if by_cohort {
        SortOrder::CohortYearAsc
    } else {
        default
    }
}

/// Re-filters the leaderboard as filter lines arrive on stdin.
async fn watch_leaderboard(client: MetricsClient, initial: Option<String>, order: SortOrder) {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to read filter from stdin");
                    break;
                }
            }
        }
    });

    debounce::run_latest(
        line_rx,
        initial,
        DebounceTimer::default(),
        move |text| {
            let client = client.clone();
            async move {
                let filters = RowFilters::default().with_student_id_contains(Some(text.as_str()));
                views::gpa_leaderboard(&client, &filters, order).await
            }
        },
        |state| print!("{}", report::render_leaderboard(&state, None)),
    )
    .await;
}

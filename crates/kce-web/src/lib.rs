//! Read-only query API and HTML views over the job store.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use kce_core::JobRecord;
use kce_storage::{JobFilter, JobStore};
use serde::{de, Deserialize, Deserializer};
use tokio::net::TcpListener;
use tracing::{error, info};

pub const CRATE_NAME: &str = "kce-web";

#[derive(Clone)]
pub struct AppState {
    pub store: JobStore,
}

impl AppState {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    #[serde(default, deserialize_with = "flag")]
    with_salary: bool,
}

/// Query-string boolean accepting `true/false`, `1/0`, `yes/no` and `on/off`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(de::Error::invalid_value(
            de::Unexpected::Str(other),
            &"a boolean flag",
        )),
    }
}

impl ListQuery {
    fn filter(&self) -> JobFilter {
        JobFilter {
            with_salary: self.with_salary,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

/// Display strings for one job; absent fields are rendered as empty cells.
#[derive(Debug, Clone)]
struct JobRow {
    id: i64,
    title: String,
    company: String,
    city: String,
    salary: String,
    url: String,
    fingerprint: String,
}

impl From<JobRecord> for JobRow {
    fn from(job: JobRecord) -> Self {
        let salary = match (job.salary_min, job.salary_max) {
            (Some(lo), Some(hi)) => format!("{lo} - {hi} zł"),
            _ => String::new(),
        };
        Self {
            id: job.id,
            title: job.title.unwrap_or_default(),
            company: job.company,
            city: job.city.unwrap_or_default(),
            salary,
            url: job.url.unwrap_or_default(),
            fingerprint: job.fingerprint,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    jobs: Vec<JobRow>,
    with_salary: bool,
}

#[derive(Template)]
#[template(path = "job_detail.html")]
struct JobDetailTemplate {
    job: JobRow,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/jobs", get(jobs_handler))
        .route("/jobs/{id}", get(job_detail_handler))
        .route("/search", get(search_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(store: JobStore, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "query service listening");
    axum::serve(listener, app(AppState::new(store))).await?;
    Ok(())
}

async fn index_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.store.list(&query.filter()).await {
        Ok(jobs) => render_html(IndexTemplate {
            jobs: jobs.into_iter().map(JobRow::from).collect(),
            with_salary: query.with_salary,
        }),
        Err(err) => server_error(err.into()),
    }
}

async fn jobs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    match state.store.list(&query.filter()).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Response {
    match state.store.search_title(&query.q).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn job_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Response {
    match state.store.get(id).await {
        Ok(Some(job)) => render_html(JobDetailTemplate { job: job.into() }),
        Ok(None) => (StatusCode::NOT_FOUND, Html("Job not found".to_string())).into_response(),
        Err(err) => server_error(err.into()),
    }
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

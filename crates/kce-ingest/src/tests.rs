use super::*;
use std::path::PathBuf;

use axum::{http::StatusCode, routing::get, Router};
use kce_storage::{JobFilter, StoreConfig};
use tempfile::{tempdir, TempDir};

const LISTING: &str = include_str!("../../../fixtures/olx/listing.html");

fn test_config(dir: &Path) -> IngestConfig {
    IngestConfig {
        data_dir: dir.join("data"),
        store: StoreConfig::for_path(dir.join("jobs.db")),
        http_timeout_secs: 5,
        ..Default::default()
    }
}

async fn pipeline_in(dir: &TempDir) -> (IngestConfig, IngestPipeline) {
    let config = test_config(dir.path());
    let pipeline = open_pipeline(&config).await.unwrap();
    (config, pipeline)
}

fn driver(company: Option<&str>, title: &str) -> JobCandidate {
    JobCandidate {
        title: Some(title.to_string()),
        url: Some("https://www.olx.pl/oferta/1".to_string()),
        company: company.map(ToString::to_string),
        city: Some("Warszawa".to_string()),
        salary_min: Some(4000),
        salary_max: Some(6000),
    }
}

fn line_count(path: impl Into<PathBuf>) -> usize {
    std::fs::read_to_string(path.into())
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

async fn serve_listing(status: StatusCode) -> String {
    let app = Router::new().route("/praca/kierowca/", get(move || async move { (status, LISTING) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/praca/kierowca/")
}

#[tokio::test]
async fn same_candidate_twice_is_stored_once() {
    let dir = tempdir().unwrap();
    let (config, pipeline) = pipeline_in(&dir).await;

    let first = pipeline.ingest(vec![driver(Some("Firma"), "Kierowca")]).await.unwrap();
    let second = pipeline.ingest(vec![driver(Some("Firma"), "Kierowca")]).await.unwrap();

    assert_eq!(first.accepted(), 1);
    assert_eq!(second.outcomes[0].disposition, Disposition::Duplicate);
    assert_eq!(first.outcomes[0].fingerprint, second.outcomes[0].fingerprint);
    assert_eq!(pipeline.store().count().await.unwrap(), 1);
    assert_eq!(line_count(config.duplicate_log_path()), 1);
    assert_eq!(line_count(config.raw_log_path()), 2);

    let audit: Vec<LoggedCandidate> = JsonlLog::new(config.duplicate_log_path())
        .read_all()
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].fingerprint.is_some());
    assert_eq!(audit[0].fingerprint, first.outcomes[0].fingerprint);
    assert_eq!(audit[0].candidate, driver(Some("Firma"), "Kierowca"));
}

#[tokio::test]
async fn first_seen_wins_within_a_batch() {
    let dir = tempdir().unwrap();
    let (_config, pipeline) = pipeline_in(&dir).await;

    let report = pipeline
        .ingest(vec![
            driver(Some("Firma"), "Kierowca C+E"),
            driver(Some("Firma"), "KIEROWCA c+e"),
        ])
        .await
        .unwrap();

    assert!(matches!(report.outcomes[0].disposition, Disposition::Accepted { .. }));
    assert_eq!(report.outcomes[1].disposition, Disposition::Duplicate);
    assert_eq!(report.outcomes[1].position, 1);
}

#[tokio::test]
async fn candidate_without_company_is_invalid_but_logged() {
    let dir = tempdir().unwrap();
    let (config, pipeline) = pipeline_in(&dir).await;

    let report = pipeline.ingest(vec![driver(None, "Kierowca")]).await.unwrap();

    assert_eq!(
        report.outcomes[0].disposition,
        Disposition::Invalid {
            reason: InvalidCandidate::MissingCompany
        }
    );
    assert_eq!(report.outcomes[0].fingerprint, None);
    assert_eq!(pipeline.store().count().await.unwrap(), 0);

    let logged: Vec<LoggedCandidate> = JsonlLog::new(config.raw_log_path()).read_all().await.unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].fingerprint, None);
    assert_eq!(logged[0].candidate.title.as_deref(), Some("Kierowca"));
}

#[tokio::test]
async fn unreachable_store_stops_the_run() {
    let dir = tempdir().unwrap();
    let (config, pipeline) = pipeline_in(&dir).await;
    pipeline.store().close().await;

    let err = pipeline
        .ingest(vec![driver(Some("Firma"), "Kierowca"), driver(Some("Inna"), "Kierowca")])
        .await
        .unwrap_err();
    match err {
        IngestError::Storage { position, report, .. } => {
            assert_eq!(position, 0);
            assert_eq!(report.processed(), 0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(line_count(config.raw_log_path()), 0);

    let summary = pipeline.run_from_markup("fixture", LISTING).await.unwrap();
    assert_eq!(summary.status, RunStatus::StorageFailed);
    assert!(!summary.is_success());
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.parsed, 5);
    assert_eq!(summary.remaining, 4);
    assert!(summary.error.is_some());
}

#[tokio::test]
async fn fixture_page_ingests_and_reruns_as_duplicates() {
    let dir = tempdir().unwrap();
    let (_config, pipeline) = pipeline_in(&dir).await;

    let first = pipeline.run_from_markup("fixture", LISTING).await.unwrap();
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(
        (first.parsed, first.accepted, first.duplicates, first.invalid),
        (5, 3, 1, 1)
    );
    assert_eq!((first.errors, first.remaining), (0, 0));

    let second = pipeline.run_from_markup("fixture", LISTING).await.unwrap();
    assert_eq!(
        (second.accepted, second.duplicates, second.invalid),
        (0, 4, 1)
    );
    assert_eq!(pipeline.store().count().await.unwrap(), 3);

    let paid = pipeline
        .store()
        .list(&JobFilter { with_salary: true })
        .await
        .unwrap();
    assert_eq!(paid.len(), 2);
}

#[tokio::test]
async fn run_once_fetches_the_configured_listing() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.source_url = serve_listing(StatusCode::OK).await;
    let pipeline = open_pipeline(&config).await.unwrap();

    let summary = pipeline.run_once().await.unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.source, config.source_url);
    assert_eq!(summary.accepted, 3);
    assert_eq!(line_count(config.raw_log_path()), 5);
}

#[tokio::test]
async fn fetch_failure_fails_the_run_before_parsing() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.source_url = serve_listing(StatusCode::NOT_FOUND).await;
    let pipeline = open_pipeline(&config).await.unwrap();

    let err = pipeline.run_once().await.unwrap_err();

    assert!(matches!(err, IngestError::Fetch(_)));
    assert_eq!(pipeline.store().count().await.unwrap(), 0);
    assert!(!config.raw_log_path().exists());
}

#[tokio::test]
async fn replay_rebuilds_a_fresh_store_from_the_raw_log() {
    let dir = tempdir().unwrap();
    let (config, pipeline) = pipeline_in(&dir).await;
    pipeline.run_from_markup("fixture", LISTING).await.unwrap();
    let raw_lines = line_count(config.raw_log_path());

    let fresh_config = IngestConfig {
        store: StoreConfig::for_path(dir.path().join("rebuilt.db")),
        ..config.clone()
    };
    let fresh = open_pipeline(&fresh_config).await.unwrap();
    let summary = fresh.replay(&config.raw_log_path()).await.unwrap();

    assert_eq!(
        (summary.parsed, summary.accepted, summary.duplicates, summary.invalid),
        (5, 3, 1, 1)
    );
    assert_eq!(line_count(config.raw_log_path()), raw_lines);
    assert_eq!(fresh.store().count().await.unwrap(), 3);
}

#[tokio::test]
async fn replay_of_missing_log_is_an_error() {
    let dir = tempdir().unwrap();
    let (_config, pipeline) = pipeline_in(&dir).await;

    let err = pipeline.replay(&dir.path().join("absent.jsonl")).await.unwrap_err();

    assert!(matches!(err, IngestError::Replay(_)));
}

#[tokio::test]
async fn unwritable_log_reports_stored_but_unlogged_row() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let config = IngestConfig {
        data_dir: blocker,
        ..test_config(dir.path())
    };
    let pipeline = open_pipeline(&config).await.unwrap();

    let summary = pipeline.run_from_markup("fixture", LISTING).await.unwrap();

    assert_eq!(summary.status, RunStatus::LogFailed);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.remaining, 4);
    assert_eq!(pipeline.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn scheduler_is_built_only_when_enabled() {
    let dir = tempdir().unwrap();
    let (mut config, pipeline) = pipeline_in(&dir).await;
    let pipeline = Arc::new(pipeline);

    assert!(maybe_build_scheduler(&config, pipeline.clone()).await.unwrap().is_none());

    config.scheduler_enabled = true;
    assert!(maybe_build_scheduler(&config, pipeline.clone()).await.unwrap().is_some());

    config.sync_crons = vec!["not a cron".to_string()];
    assert!(maybe_build_scheduler(&config, pipeline).await.is_err());
}

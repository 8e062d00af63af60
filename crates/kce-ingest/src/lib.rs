//! Fetch → parse → fingerprint → store orchestration.
//!
//! Deduplication is delegated entirely to the store's UNIQUE constraint on `fingerprint`:
//! candidates are never compared with each other, so two equal candidates in one batch
//! produce one accepted row and one duplicate (first seen wins).
//!
//! Log ordering: the store write happens first, then the duplicate audit line (if any),
//! then the raw log line. A crash between the two leaves a row that is stored but not
//! logged; replaying the raw log later only produces duplicates for it.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use kce_adapters::{adapter_for_source, AdapterError, SourceAdapter};
use kce_core::{InvalidCandidate, JobCandidate};
use kce_storage::{HttpFetcher, InsertOutcome, JobStore, JsonlLog, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod config;

pub use config::IngestConfig;

pub const CRATE_NAME: &str = "kce-ingest";

/// One line of the raw record log and of the duplicate audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedCandidate {
    #[serde(flatten)]
    pub candidate: JobCandidate,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Disposition {
    Accepted { id: i64 },
    Duplicate,
    Invalid { reason: InvalidCandidate },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateOutcome {
    pub position: usize,
    pub fingerprint: Option<String>,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub outcomes: Vec<CandidateOutcome>,
}

impl IngestReport {
    pub fn accepted(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Accepted { .. }))
    }

    pub fn duplicates(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Duplicate))
    }

    pub fn invalid(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Invalid { .. }))
    }

    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    fn count(&self, pred: impl Fn(&Disposition) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.disposition)).count()
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("listing fetch failed: {0}")]
    Fetch(#[from] AdapterError),
    /// The candidate at `position` could not be stored; `report` covers the ones before it.
    #[error("storage unavailable at candidate {position}: {source}")]
    Storage {
        position: usize,
        report: IngestReport,
        #[source]
        source: StoreError,
    },
    /// The candidate at `position` reached the store but its log line was not written.
    #[error("writing ingestion log at candidate {position}: {message}")]
    Log {
        position: usize,
        report: IngestReport,
        message: String,
    },
    #[error("reading replay log: {0}")]
    Replay(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    StorageFailed,
    LogFailed,
}

/// Externally observable result of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source: String,
    pub parsed: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub errors: usize,
    /// Candidates never attempted because the run stopped early.
    pub remaining: usize,
    pub status: RunStatus,
    pub error: Option<String>,
}

impl IngestRunSummary {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawLogging {
    Record,
    Skip,
}

pub struct IngestPipeline {
    store: JobStore,
    adapter: Box<dyn SourceAdapter>,
    http: HttpFetcher,
    source_url: String,
    raw_log: JsonlLog,
    duplicate_log: JsonlLog,
}

impl IngestPipeline {
    pub fn new(config: &IngestConfig, store: JobStore) -> anyhow::Result<Self> {
        let adapter = adapter_for_source(&config.source_id)?;
        let http = HttpFetcher::new(config.http_client_config())?;
        Ok(Self {
            store,
            adapter,
            http,
            source_url: config.source_url.clone(),
            raw_log: JsonlLog::new(config.raw_log_path()),
            duplicate_log: JsonlLog::new(config.duplicate_log_path()),
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Fetch the configured listing page and ingest everything on it.
    ///
    /// A fetch failure fails the whole run before anything is parsed. Storage and log
    /// failures end the run early and are reported through the summary status.
    pub async fn run_once(&self) -> Result<IngestRunSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_run", %run_id, source = %self.source_url);
        async {
            let started_at = Utc::now();
            let markup = self.adapter.fetch_listing(&self.http, &self.source_url).await?;
            let candidates = self.adapter.parse_listing(&markup);
            let parsed = candidates.len();
            let result = self.ingest(candidates).await;
            summarize(run_id, started_at, &self.source_url, parsed, result)
        }
        .instrument(span)
        .await
    }

    /// Ingest a listing page saved to disk, skipping the fetch.
    pub async fn run_from_markup(
        &self,
        source: &str,
        markup: &str,
    ) -> Result<IngestRunSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let candidates = self.adapter.parse_listing(markup);
        let parsed = candidates.len();
        let result = self
            .ingest_with(candidates, RawLogging::Record)
            .instrument(info_span!("ingest_run", %run_id, source))
            .await;
        summarize(run_id, started_at, source, parsed, result)
    }

    /// Re-submit every candidate of a raw record log. The raw log itself is not appended to.
    pub async fn replay(&self, path: &Path) -> Result<IngestRunSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let entries: Vec<LoggedCandidate> = JsonlLog::new(path)
            .read_all()
            .await
            .map_err(|e| IngestError::Replay(format!("{e:#}")))?;
        let candidates = entries.into_iter().map(|e| e.candidate).collect::<Vec<_>>();
        let parsed = candidates.len();
        let source = path.display().to_string();
        let result = self
            .ingest_with(candidates, RawLogging::Skip)
            .instrument(info_span!("replay_run", %run_id, source = %source))
            .await;
        summarize(run_id, started_at, &source, parsed, result)
    }

    /// Hash and store each candidate in order, logging every disposition.
    pub async fn ingest(&self, candidates: Vec<JobCandidate>) -> Result<IngestReport, IngestError> {
        self.ingest_with(candidates, RawLogging::Record).await
    }

    async fn ingest_with(
        &self,
        candidates: Vec<JobCandidate>,
        raw_logging: RawLogging,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();

        for (position, candidate) in candidates.into_iter().enumerate() {
            let fingerprint = candidate.fingerprint();
            let disposition = match candidate.clone().into_new_job() {
                Err(reason) => {
                    debug!(position, %reason, "candidate skipped");
                    Disposition::Invalid { reason }
                }
                Ok(job) => match self.store.insert_unique(&job).await {
                    Ok(InsertOutcome::Inserted(id)) => {
                        debug!(position, id, fingerprint = %job.fingerprint, "candidate accepted");
                        Disposition::Accepted { id }
                    }
                    Ok(InsertOutcome::DuplicateConflict) => {
                        debug!(position, fingerprint = %job.fingerprint, "candidate is a duplicate");
                        Disposition::Duplicate
                    }
                    Err(source) => {
                        error!(position, error = %source, "store rejected candidate");
                        return Err(IngestError::Storage {
                            position,
                            report,
                            source,
                        });
                    }
                },
            };

            report.outcomes.push(CandidateOutcome {
                position,
                fingerprint: fingerprint.clone(),
                disposition,
            });

            let entry = LoggedCandidate {
                candidate,
                fingerprint,
            };
            if let Err(err) = self.log_disposition(&entry, disposition, raw_logging).await {
                error!(position, error = %format!("{err:#}"), "ingestion log write failed");
                return Err(IngestError::Log {
                    position,
                    report,
                    message: format!("{err:#}"),
                });
            }
        }

        Ok(report)
    }

    async fn log_disposition(
        &self,
        entry: &LoggedCandidate,
        disposition: Disposition,
        raw_logging: RawLogging,
    ) -> anyhow::Result<()> {
        if disposition == Disposition::Duplicate {
            self.duplicate_log
                .append(entry)
                .await
                .context("appending duplicate audit line")?;
        }
        if raw_logging == RawLogging::Record {
            self.raw_log
                .append(entry)
                .await
                .context("appending raw record line")?;
        }
        Ok(())
    }
}

fn summarize(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    source: &str,
    parsed: usize,
    result: Result<IngestReport, IngestError>,
) -> Result<IngestRunSummary, IngestError> {
    let (report, status, failed_at, error) = match result {
        Ok(report) => (report, RunStatus::Completed, None, None),
        Err(IngestError::Storage {
            position,
            report,
            source,
        }) => (
            report,
            RunStatus::StorageFailed,
            Some(position),
            Some(source.to_string()),
        ),
        Err(IngestError::Log {
            position,
            report,
            message,
        }) => (report, RunStatus::LogFailed, Some(position), Some(message)),
        Err(other) => return Err(other),
    };

    let attempted = failed_at.map_or(report.processed(), |position| position + 1);

    let summary = IngestRunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        source: source.to_string(),
        parsed,
        accepted: report.accepted(),
        duplicates: report.duplicates(),
        invalid: report.invalid(),
        errors: usize::from(status != RunStatus::Completed),
        remaining: parsed.saturating_sub(attempted),
        status,
        error,
    };

    if summary.is_success() {
        info!(
            parsed = summary.parsed,
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            invalid = summary.invalid,
            "ingestion run complete"
        );
    } else {
        warn!(
            status = ?summary.status,
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            remaining = summary.remaining,
            error = summary.error.as_deref().unwrap_or_default(),
            "ingestion run stopped early"
        );
    }
    Ok(summary)
}

pub async fn open_pipeline(config: &IngestConfig) -> anyhow::Result<IngestPipeline> {
    let store = JobStore::open(&config.store)
        .await
        .with_context(|| format!("opening job store {}", config.store.database_url))?;
    IngestPipeline::new(config, store)
}

/// Scheduler running [`IngestPipeline::run_once`] on every configured cron expression,
/// or `None` when scheduling is disabled.
pub async fn maybe_build_scheduler(
    config: &IngestConfig,
    pipeline: Arc<IngestPipeline>,
) -> anyhow::Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for cron in &config.sync_crons {
        let pipeline = pipeline.clone();
        let job = Job::new_async(cron, move |_uuid, _l| {
            let pipeline = pipeline.clone();
            Box::pin(async move {
                match pipeline.run_once().await {
                    Ok(summary) if summary.is_success() => {}
                    Ok(summary) => warn!(run_id = %summary.run_id, "scheduled ingestion incomplete"),
                    Err(err) => error!(error = %err, "scheduled ingestion failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
    }
    Ok(Some(sched))
}

/// Run scheduled ingestion until Ctrl-C.
pub async fn run_scheduler_until_shutdown(config: &IngestConfig) -> anyhow::Result<()> {
    let pipeline = Arc::new(open_pipeline(config).await?);
    let Some(mut sched) = maybe_build_scheduler(config, pipeline).await? else {
        anyhow::bail!("scheduler disabled; set KCE_SCHEDULER_ENABLED=true");
    };
    sched.start().await.context("starting scheduler")?;
    info!(crons = ?config.sync_crons, "ingestion scheduler started");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    sched.shutdown().await.context("stopping scheduler")?;
    Ok(())
}

#[cfg(test)]
mod tests;

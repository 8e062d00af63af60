//! SQLite-backed job table with fingerprint uniqueness enforced by the engine.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use kce_core::{JobRecord, NewJob};
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;
use tracing::debug;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const JOB_COLUMNS: &str =
    "id, company, city, title, salary_min, salary_max, url, fingerprint";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound for pool acquisition and for waiting on SQLite locks.
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/jobs.db".to_string(),
            max_connections: 5,
            timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: defaults.max_connections,
            timeout: std::env::var("KCE_DB_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    pub fn for_path(path: impl AsRef<Path>) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.as_ref().display()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("schema migration failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error("creating database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    DuplicateConflict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFilter {
    /// Only jobs with both salary bounds present.
    pub with_salary: bool,
}

/// Shared handle to the job table. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.timeout);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::Directory {
                        path: parent.display().to_string(),
                        source,
                    })?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.timeout)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Connect and bring the schema up to date.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self::connect(config).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert inside its own transaction. A fingerprint collision rolls the transaction back
    /// and is reported as [`InsertOutcome::DuplicateConflict`]; every other failure is an error.
    pub async fn insert_unique(&self, job: &NewJob) -> Result<InsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (company, city, title, salary_min, salary_max, url, fingerprint)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.company)
        .bind(&job.city)
        .bind(&job.title)
        .bind(job.salary_min)
        .bind(job.salary_max)
        .bind(&job.url)
        .bind(&job.fingerprint)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                tx.commit().await?;
                debug!(id, fingerprint = %job.fingerprint, "job inserted");
                Ok(InsertOutcome::Inserted(id))
            }
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                Ok(InsertOutcome::DuplicateConflict)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(job_from_row).transpose()?)
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
              FROM jobs
             WHERE (? = 0 OR (salary_min IS NOT NULL AND salary_max IS NOT NULL))
             ORDER BY id
            "#
        ))
        .bind(filter.with_salary)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(job_from_row).collect::<Result<_, _>>()?)
    }

    /// Case-insensitive (ASCII) substring match on title.
    pub async fn search_title(&self, needle: &str) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
              FROM jobs
             WHERE title LIKE '%' || ? || '%' ESCAPE '\'
             ORDER BY id
            "#
        ))
        .bind(escape_like(needle))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(job_from_row).collect::<Result<_, _>>()?)
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// `fingerprint` is the only UNIQUE column besides the rowid, which is never supplied.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn job_from_row(row: &SqliteRow) -> Result<JobRecord, sqlx::Error> {
    Ok(JobRecord {
        id: row.try_get("id")?,
        company: row.try_get("company")?,
        city: row.try_get("city")?,
        title: row.try_get("title")?,
        salary_min: row.try_get("salary_min")?,
        salary_max: row.try_get("salary_max")?,
        url: row.try_get("url")?,
        fingerprint: row.try_get("fingerprint")?,
    })
}

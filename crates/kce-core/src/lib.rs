//! Core domain model and identity hashing for KierowcaCE.

use serde::{Deserialize, Serialize};

pub mod identity;

pub use identity::{fingerprint, slugify};

pub const CRATE_NAME: &str = "kce-core";

/// Unpersisted record as produced by a listing parser. Every field is best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobCandidate {
    pub title: Option<String>,
    pub url: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
}

impl JobCandidate {
    /// Fingerprint of this candidate, or `None` when it has no usable company.
    pub fn fingerprint(&self) -> Option<String> {
        let company = self.company()?;
        Some(fingerprint(
            company,
            self.city.as_deref(),
            self.title.as_deref().unwrap_or_default(),
        ))
    }

    fn company(&self) -> Option<&str> {
        self.company.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Validate and attach identity. Fails only when the company is missing or blank.
    pub fn into_new_job(self) -> Result<NewJob, InvalidCandidate> {
        let Some(fingerprint) = self.fingerprint() else {
            return Err(InvalidCandidate::MissingCompany);
        };
        let (salary_min, salary_max) = salary_pair(self.salary_min, self.salary_max);
        Ok(NewJob {
            company: self.company.unwrap_or_default(),
            city: self.city,
            title: self.title,
            salary_min,
            salary_max,
            url: self.url,
            fingerprint,
        })
    }
}

/// Reasons a candidate cannot become a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidCandidate {
    MissingCompany,
}

impl std::fmt::Display for InvalidCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCompany => f.write_str("candidate has no company"),
        }
    }
}

/// Salary bounds are kept only as an ordered pair; anything else collapses to `(None, None)`.
pub fn salary_pair(min: Option<i64>, max: Option<i64>) -> (Option<i64>, Option<i64>) {
    match (min, max) {
        (Some(lo), Some(hi)) if lo <= hi => (Some(lo), Some(hi)),
        _ => (None, None),
    }
}

/// Validated insert payload handed to the job store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub company: String,
    pub city: Option<String>,
    pub title: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub url: Option<String>,
    pub fingerprint: String,
}

/// Persisted job row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub company: String,
    pub city: Option<String>,
    pub title: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub url: Option<String>,
    pub fingerprint: String,
}

impl JobRecord {
    pub fn has_salary(&self) -> bool {
        self.salary_min.is_some() && self.salary_max.is_some()
    }
}

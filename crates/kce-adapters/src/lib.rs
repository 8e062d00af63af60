//! Source adapter contract and the OLX listing parser.

use async_trait::async_trait;
use kce_core::{salary_pair, JobCandidate};
use kce_storage::{FetchError, HttpFetcher};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "kce-adapters";

pub const OLX_SOURCE_ID: &str = "olx";
pub const OLX_LISTING_URL: &str = "https://www.olx.pl/praca/kierowca/";

const OLX_ITEM: &str = ".css-1sw7q4x";
const OLX_ANCHOR: &str = "a";
const OLX_COMPANY: &str = ".css-19yf5ek";
const OLX_CITY: &str = ".css-1p8f3b8";
const OLX_SALARY: &str = ".css-1q2w7lz";

const SALARY_RANGE_SEPARATOR: char = '-';
const SALARY_UNIT: &str = "zł";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error("no adapter registered for source `{0}`")]
    UnknownSource(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_listing(&self, http: &HttpFetcher, url: &str) -> Result<String, AdapterError> {
        let resp = http.fetch_text(url).await?;
        debug!(
            source_id = self.source_id(),
            final_url = %resp.final_url,
            bytes = resp.body.len(),
            "listing fetched"
        );
        Ok(resp.body)
    }

    /// Best-effort extraction: one candidate per listing item, in document order.
    fn parse_listing(&self, markup: &str) -> Vec<JobCandidate>;
}

#[derive(Debug, Clone)]
struct ListingSelectors {
    item: Selector,
    anchor: Selector,
    company: Selector,
    city: Selector,
    salary: Selector,
}

impl ListingSelectors {
    fn olx() -> Result<Self, AdapterError> {
        Ok(Self {
            item: compile(OLX_ITEM)?,
            anchor: compile(OLX_ANCHOR)?,
            company: compile(OLX_COMPANY)?,
            city: compile(OLX_CITY)?,
            salary: compile(OLX_SALARY)?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct OlxAdapter {
    selectors: ListingSelectors,
}

impl OlxAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        Ok(Self {
            selectors: ListingSelectors::olx()?,
        })
    }

    fn parse_item(&self, item: ElementRef<'_>) -> JobCandidate {
        let anchor = item.select(&self.selectors.anchor).next();
        let (salary_min, salary_max) = first_text(item, &self.selectors.salary)
            .map(|raw| parse_salary(&raw))
            .unwrap_or((None, None));

        JobCandidate {
            title: anchor.and_then(element_text),
            url: anchor
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| non_empty(href.to_string())),
            company: first_text(item, &self.selectors.company),
            city: first_text(item, &self.selectors.city),
            salary_min,
            salary_max,
        }
    }
}

#[async_trait]
impl SourceAdapter for OlxAdapter {
    fn source_id(&self) -> &'static str {
        OLX_SOURCE_ID
    }

    fn parse_listing(&self, markup: &str) -> Vec<JobCandidate> {
        let document = Html::parse_document(markup);
        document
            .select(&self.selectors.item)
            .map(|item| self.parse_item(item))
            .collect()
    }
}

pub fn adapter_for_source(source_id: &str) -> Result<Box<dyn SourceAdapter>, AdapterError> {
    match source_id {
        OLX_SOURCE_ID => Ok(Box::new(OlxAdapter::new()?)),
        other => Err(AdapterError::UnknownSource(other.to_string())),
    }
}

/// Parse a `"<min>-<max> zł"` token. Anything but exactly two integer parts yields no salary.
pub fn parse_salary(raw: &str) -> (Option<i64>, Option<i64>) {
    if !raw.contains(SALARY_RANGE_SEPARATOR) {
        return (None, None);
    }
    let compact = raw
        .replace(SALARY_UNIT, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    let parts = compact.split(SALARY_RANGE_SEPARATOR).collect::<Vec<_>>();
    let [lo, hi] = parts.as_slice() else {
        return (None, None);
    };
    match (lo.parse::<i64>(), hi.parse::<i64>()) {
        (Ok(lo), Ok(hi)) => salary_pair(Some(lo), Some(hi)),
        _ => (None, None),
    }
}

// Text goes into the fingerprint verbatim, so it is never trimmed. Only an element with no
// text at all counts as absent.
fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    non_empty(element.text().collect::<String>())
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope.select(selector).next().and_then(element_text)
}

//! Job store, listing fetch and append-only logs for KierowcaCE.

pub mod fetch;
pub mod jsonl;
pub mod store;

pub use fetch::{
    BackoffPolicy, FetchError, FetchedResponse, HttpClientConfig, HttpFetcher, RetryDisposition,
};
pub use jsonl::JsonlLog;
pub use store::{InsertOutcome, JobFilter, JobStore, StoreConfig, StoreError};

pub const CRATE_NAME: &str = "kce-storage";

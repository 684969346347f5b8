//! Upstream HTTP access
//!
//! [`fetch`] issues single JSON requests with a per-attempt timeout and
//! bounded exponential backoff. [`socrata`] builds paginated SoQL queries on
//! top of it.

pub mod fetch;
pub mod socrata;

pub use fetch::{FetchClient, FetchOptions, FetchResponse, backoff_delay, classify_status, retry_with_backoff};
pub use socrata::{PageFetcher, SocrataClient, SocrataQuery, fetch_all_pages};

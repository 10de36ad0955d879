//! Remote catalog access.
//!
//! The harvester only talks to the [`CatalogClient`] trait; `evds` is the HTTP
//! implementation used by the binary.

use thiserror::Error;

use crate::domain::{Category, DateRange, RawTable, SeriesEntry, SubCategory};

pub mod evds;

pub use evds::EvdsClient;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

/// The four listings the harvester needs from the data service.
pub trait CatalogClient {
    fn categories(&self) -> Result<Vec<Category>, FetchError>;

    fn sub_categories(&self, category_id: &str) -> Result<Vec<SubCategory>, FetchError>;

    fn series(&self, sub_category_code: &str) -> Result<Vec<SeriesEntry>, FetchError>;

    /// Observations of `code` within `range` (inclusive). `None` when the
    /// service has nothing for that range.
    fn observations(&self, code: &str, range: &DateRange) -> Result<Option<RawTable>, FetchError>;
}

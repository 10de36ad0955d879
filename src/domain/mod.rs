//! Domain types used throughout the harvester.
//!
//! This module defines:
//!
//! - run configuration enums (`FetchMode`, `StoreLayout`) and `HarvestConfig`
//! - catalog entries (`Category`, `SubCategory`, `SeriesEntry`, `SeriesRecord`)
//! - payloads and observations (`RawTable`, `RecordSet`, `Observation`)

pub mod types;

pub use types::*;

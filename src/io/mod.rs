//! Input/output helpers.
//!
//! - date cell parsing (`dates`)
//! - payload normalization (`normalize`)
//! - series files: path layout, merge, rewrite (`store`)

pub mod dates;
pub mod normalize;
pub mod store;

pub use normalize::{NormalizeError, normalize};
pub use store::{Store, StoreError, WriteOutcome, merge_and_persist};

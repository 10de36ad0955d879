//! `evds-harvest` library crate.
//!
//! The `evds` binary is a thin wrapper around [`app::run`]; the harvest loop,
//! the EVDS client and the CSV store are all usable and testable on their own.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod obs;
pub mod report;

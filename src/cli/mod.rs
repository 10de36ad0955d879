//! Command-line parsing for the EVDS harvester.
//!
//! Parsing only; turning arguments into a [`HarvestConfig`](crate::domain::HarvestConfig)
//! happens in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::evds::BASE_URL;
use crate::domain::{FetchMode, LogFormat, StoreLayout};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "evds", version, about = "Mirror EVDS (CBRT) time series into local CSV files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk the full catalog and update every series file (default).
    Harvest(RunArgs),
    /// Update only the listed series codes.
    Series(SeriesArgs),
}

/// Options shared by every command.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Output root for series files.
    #[arg(short, long, env = "EVDS_DATA_DIR", default_value = "data")]
    pub out: PathBuf,

    /// `full` fetches from --start; `recent` only the last --days days.
    #[arg(short, long, value_enum, default_value_t = FetchMode::Full)]
    pub mode: FetchMode,

    /// Window length for `--mode recent`.
    #[arg(long, default_value_t = 7)]
    pub days: u32,

    /// First date requested in full mode (DD-MM-YYYY).
    #[arg(long, default_value = "01-01-2000")]
    pub start: String,

    /// Pause between data requests, in milliseconds.
    #[arg(long, default_value_t = 600)]
    pub sleep_ms: u64,

    /// `nested` = <out>/<category>/<sub-category>/<code>.csv, `flat` = <out>/<code>.csv.
    #[arg(long, value_enum, default_value_t = StoreLayout::Nested)]
    pub layout: StoreLayout,

    #[arg(long, env = "EVDS_BASE_URL", default_value = BASE_URL)]
    pub base_url: String,

    /// HTTP timeout per request, in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// Log level or filter directive (EVDS_LOG takes precedence).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Args, Clone)]
pub struct SeriesArgs {
    /// Series codes, e.g. TP.DK.USD.A
    #[arg(required = true, value_name = "CODE")]
    pub codes: Vec<String>,

    /// Category directory used by the nested layout.
    #[arg(long, default_value = "manual")]
    pub category: String,

    /// Sub-category directory used by the nested layout.
    #[arg(long, default_value = "manual")]
    pub group: String,

    #[command(flatten)]
    pub run: RunArgs,
}

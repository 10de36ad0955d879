//! Top-level application orchestration.
//!
//! `src/main.rs` only maps the result to an exit code; this module:
//! - loads `.env` and parses arguments
//! - sets up logging and the Ctrl-C handler
//! - checks the credential, then opens the output root
//! - runs the harvester and prints the summary (text, or one JSON line with
//!   `--log-format json`)

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing::{info, warn};

use crate::cli::{Cli, Command, RunArgs, SeriesArgs};
use crate::data::EvdsClient;
use crate::domain::{HarvestConfig, LogFormat, REQUEST_DATE_FORMAT, SeriesRecord};
use crate::error::AppError;
use crate::io::Store;
use crate::report::{HarvestSummary, format_elapsed, format_summary, format_summary_json};

pub mod pipeline;

use pipeline::{CancelFlag, Harvester};

/// Entry point for the `evds` binary. The elapsed line is printed however the
/// run ends.
pub fn run() -> Result<(), AppError> {
    let started = Instant::now();
    let result = dispatch(started);
    println!("{}", format_elapsed(started.elapsed()));
    result
}

fn dispatch(started: Instant) -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // `evds` and `evds --mode recent` mean `evds harvest ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);

    match cli.command {
        Command::Harvest(args) => handle_harvest(&args, started),
        Command::Series(args) => handle_series(&args, started),
    }
}

fn handle_harvest(args: &RunArgs, started: Instant) -> Result<(), AppError> {
    let (session, store) = Session::start(args, started)?;
    let summary = Harvester::new(
        &session.client,
        store,
        session.range(),
        session.config.delay,
        &session.cancel,
    )
    .run();
    session.finish(&summary);
    Ok(())
}

fn handle_series(args: &SeriesArgs, started: Instant) -> Result<(), AppError> {
    let records = series_records(args);
    let (session, store) = Session::start(&args.run, started)?;
    let summary = Harvester::new(
        &session.client,
        store,
        session.range(),
        session.config.delay,
        &session.cancel,
    )
    .run_series(&records);
    session.finish(&summary);
    Ok(())
}

/// What a run needs besides the store, set up in the order failures should
/// surface: configuration, logging, credential, output root.
struct Session {
    config: HarvestConfig,
    today: NaiveDate,
    log_format: LogFormat,
    client: EvdsClient,
    cancel: CancelFlag,
}

impl Session {
    fn start(args: &RunArgs, started: Instant) -> Result<(Self, Store), AppError> {
        let config = harvest_config_from_args(args)?;
        crate::obs::init_tracing(&args.log_level, args.log_format)?;

        let client = EvdsClient::from_env(&config.base_url, config.timeout)?;
        let store = Store::open(&config.out_dir, config.layout).map_err(|e| AppError::storage(e.to_string()))?;

        let cancel = CancelFlag::new();
        cancel.install_ctrlc(started)?;

        let today = Local::now().date_naive();
        let range = config.date_range(today);
        info!(
            out = %store.root().display(),
            mode = ?config.mode,
            start = %range.start_param(),
            end = %range.end_param(),
            "harvest starting"
        );

        let session = Self {
            config,
            today,
            log_format: args.log_format,
            client,
            cancel,
        };
        Ok((session, store))
    }

    fn range(&self) -> crate::domain::DateRange {
        self.config.date_range(self.today)
    }

    fn finish(&self, summary: &HarvestSummary) {
        if summary.interrupted {
            info!("interrupted, stopping after the last completed series");
        }
        let range = self.range();
        match self.log_format {
            LogFormat::Text => print!("{}", format_summary(summary, self.config.mode, &range)),
            LogFormat::Json => match format_summary_json(summary, self.config.mode, &range) {
                Ok(line) => println!("{line}"),
                Err(err) => {
                    warn!(error = %err, "could not serialize summary");
                    print!("{}", format_summary(summary, self.config.mode, &range));
                }
            },
        }
    }
}

pub fn harvest_config_from_args(args: &RunArgs) -> Result<HarvestConfig, AppError> {
    let epoch = NaiveDate::parse_from_str(args.start.trim(), REQUEST_DATE_FORMAT)
        .map_err(|_| AppError::config(format!("--start must be DD-MM-YYYY, got `{}`", args.start)))?;
    if args.days == 0 {
        return Err(AppError::config("--days must be at least 1"));
    }
    if args.timeout_secs == 0 {
        return Err(AppError::config("--timeout-secs must be at least 1"));
    }

    Ok(HarvestConfig {
        out_dir: args.out.clone(),
        layout: args.layout,
        mode: args.mode,
        window_days: args.days,
        epoch,
        delay: Duration::from_millis(args.sleep_ms),
        base_url: args.base_url.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
    })
}

fn series_records(args: &SeriesArgs) -> Vec<SeriesRecord> {
    args.codes
        .iter()
        .map(|code| SeriesRecord {
            code: code.trim().to_string(),
            name: String::new(),
            category: args.category.clone(),
            sub_category: args.group.clone(),
        })
        .collect()
}

/// Rewrite argv so `evds` defaults to `evds harvest`.
///
/// - `evds`                      -> `evds harvest`
/// - `evds --mode recent ...`    -> `evds harvest --mode recent ...`
/// - `evds --help/--version/-h`  -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(first) = argv.get(1) else {
        argv.push("harvest".to_string());
        return argv;
    };

    let top_level = matches!(
        first.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help" | "harvest" | "series"
    );
    if !top_level && first.starts_with('-') {
        argv.insert(1, "harvest".to_string());
    }
    argv
}

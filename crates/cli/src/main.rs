//! booktrack CLI - reading progress log and completion estimates.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use booktrack_core::{Date, Observation, ReadingRecord, RecordFilter, RecordId, DATE_FORMAT};
use booktrack_progress::{
    worksheet_file_name, write_blank, CompletionEstimator, EstimateOutcome, EstimatorConfig,
    Persistence, Worksheet, ESTIMATOR_VERSION,
};
use booktrack_storage::{JsonStorage, Storage};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DIVIDER_WIDTH: usize = 72;

#[derive(Parser)]
#[command(name = "booktrack")]
#[command(about = "Reading progress log and completion date estimates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage directory for JSON records
    #[arg(short, long, env = "BOOKTRACK_STORAGE", default_value = ".booktrack", global = true)]
    storage: PathBuf,

    /// SQLite database file (requires the `sqlite` feature)
    #[arg(long, env = "BOOKTRACK_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Record(RecordCommand),
    /// Standalone worksheet files
    Worksheet {
        #[command(subcommand)]
        action: WorksheetCommand,
    },
    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum RecordCommand {
    /// Start a reading record for a book
    Start {
        /// Book title
        title: String,
        /// Book author
        #[arg(long)]
        author: Option<String>,
        /// Last readable page
        #[arg(long, value_parser = parse_page_count)]
        pages: Option<f64>,
        /// Start date (YYYY-MM-DD, default today)
        #[arg(long)]
        start_date: Option<Date>,
    },
    /// Record the page reached on a day
    Pages {
        /// Record ID
        record: RecordId,
        /// Page reached
        page: u32,
        /// Date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<Date>,
    },
    /// Set the last readable page of a record
    SetPages {
        /// Record ID
        record: RecordId,
        /// Last readable page
        #[arg(value_parser = parse_page_count)]
        pages: f64,
    },
    /// List reading records
    List {
        /// Filter by title substring
        #[arg(long)]
        title: Option<String>,
    },
    /// Show a record and its observations
    Show {
        /// Record ID
        record: RecordId,
    },
    /// Estimate the completion date of a record
    Estimate {
        /// Record ID
        record: RecordId,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
        /// Do not save the estimate
        #[arg(long)]
        no_save: bool,
        /// Observations required before estimating
        #[arg(long, default_value = "2")]
        min_observations: usize,
    },
}

#[derive(Subcommand)]
enum WorksheetCommand {
    /// Write a blank dated worksheet
    New {
        /// Book title
        title: String,
        /// First date on the sheet (YYYY-MM-DD)
        start_date: Date,
        /// Readable page count
        pages: u32,
        /// Number of dated rows
        #[arg(long, default_value = "30")]
        days: u32,
        /// Output file (default derived from the title)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Estimate completion from a filled-in worksheet
    Estimate {
        /// Worksheet file
        file: PathBuf,
    },
}

/// Page counts must be finite and positive.
fn parse_page_count(s: &str) -> std::result::Result<f64, String> {
    let pages: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if pages.is_finite() && pages > 0.0 {
        Ok(pages)
    } else {
        Err(format!("page count must be a positive number, got {}", s))
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "booktrack=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn open_storage(dir: &Path, database: Option<&Path>) -> Result<Box<dyn Storage>> {
    if let Some(path) = database {
        #[cfg(feature = "sqlite")]
        {
            debug!("Opening SQLite database {}", path.display());
            let storage = booktrack_storage::SqliteStorage::new_from_path(path)
                .await
                .with_context(|| format!("opening database {}", path.display()))?;
            return Ok(Box::new(storage));
        }
        #[cfg(not(feature = "sqlite"))]
        anyhow::bail!(
            "cannot open {}: built without SQLite support (enable the `sqlite` feature)",
            path.display()
        );
    }

    debug!("Opening JSON storage {}", dir.display());
    let storage = JsonStorage::new(dir)
        .await
        .with_context(|| format!("opening storage {}", dir.display()))?;
    Ok(Box::new(storage))
}

fn today() -> Date {
    chrono::Local::now().date_naive()
}

fn fmt_date(date: Date) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn divider() -> String {
    "*".repeat(DIVIDER_WIDTH)
}

fn book_line(record: &ReadingRecord) -> String {
    let by = record
        .author
        .as_deref()
        .map(|a| format!(" by {}", a))
        .unwrap_or_default();
    match record.total_pages {
        Some(pages) => format!("\"{}\"{} has {} pages.", record.title, by, pages),
        None => format!("\"{}\"{} (page count not set).", record.title, by),
    }
}

fn estimate_banner(record: &ReadingRecord, outcome: &EstimateOutcome) -> String {
    let result = &outcome.result;
    [
        divider(),
        book_line(record),
        String::new(),
        format!(
            "\"{}\" estimated finish on {}.",
            record.title,
            fmt_date(result.likely_date)
        ),
        format!(
            "  Earliest: {} Latest: {}.",
            fmt_date(result.earliest_date),
            fmt_date(result.latest_date)
        ),
        divider(),
    ]
    .join("\n")
}

#[derive(Serialize)]
struct EstimateReport<'a> {
    record_id: RecordId,
    title: &'a str,
    total_pages: f64,
    likely_date: Date,
    earliest_date: Date,
    latest_date: Date,
    estimate: [String; 3],
    computed_at: booktrack_core::Time,
    saved: bool,
}

impl<'a> EstimateReport<'a> {
    fn new(record: &'a ReadingRecord, outcome: &EstimateOutcome) -> Self {
        Self {
            record_id: outcome.record_id,
            title: &record.title,
            total_pages: outcome.target.total_pages,
            likely_date: outcome.result.likely_date,
            earliest_date: outcome.result.earliest_date,
            latest_date: outcome.result.latest_date,
            estimate: outcome.result.as_triple(),
            computed_at: outcome.computed_at,
            saved: matches!(outcome.persistence, Persistence::Saved),
        }
    }
}

async fn require_record(storage: &dyn Storage, id: RecordId) -> Result<ReadingRecord> {
    storage
        .load_record(id)
        .await?
        .with_context(|| format!("record {} not found", id))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Worksheet { action } => run_worksheet(action),
        Commands::Record(command) => {
            let mut storage = open_storage(&cli.storage, cli.database.as_deref()).await?;
            run_record_command(storage.as_mut(), command).await
        }
    }
}

fn print_version() {
    println!("{}", divider());
    println!("        Book Reading Progress and Estimates");
    println!("{}", divider());
    println!("Tool Version:      {}", env!("CARGO_PKG_VERSION"));
    println!("Estimates Version: {}", ESTIMATOR_VERSION);
    println!("{}", divider());
}

async fn run_record_command(storage: &mut dyn Storage, command: RecordCommand) -> Result<()> {
    match command {
        RecordCommand::Start { title, author, pages, start_date } => {
            let mut record = ReadingRecord::new(title, start_date.unwrap_or_else(today));
            record.author = author;
            record.total_pages = pages;
            storage.save_record(&record).await?;
            println!("{} started on {}.", record.id, fmt_date(record.start_date));
        }
        RecordCommand::Pages { record, page, date } => {
            let date = date.unwrap_or_else(today);
            let updated = storage
                .add_observation(record, Observation::new(date, page))
                .await
                .with_context(|| format!("adding page to record {}", record))?;
            println!("{} read to page {} on {}.", updated.id, page, fmt_date(date));
        }
        RecordCommand::SetPages { record, pages } => {
            let updated = storage.set_total_pages(record, pages).await?;
            println!("{}", book_line(&updated));
        }
        RecordCommand::List { title } => {
            let records = storage.list_records(&RecordFilter { title }).await?;

            println!("Records ({})", records.len());
            for record in records {
                let finish = record
                    .latest_estimate()
                    .map(|e| fmt_date(e.result.likely_date))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  Start date: {}   Record ID: {}   Estimated Finish: {}   {}",
                    fmt_date(record.start_date),
                    record.id,
                    finish,
                    record.title,
                );
            }
        }
        RecordCommand::Show { record } => {
            let record = require_record(storage, record).await?;

            println!("Record: {}", record.id);
            println!("  {}", book_line(&record));
            println!("  Started: {}", fmt_date(record.start_date));
            println!("  Observations ({}):", record.observations.len());
            for o in &record.observations {
                println!("    {}  page {}", fmt_date(o.date), o.page);
            }
            if let Some(e) = record.latest_estimate() {
                let [likely, earliest, latest] = e.result.as_triple();
                println!("  Last estimate: {} (earliest {}, latest {})", likely, earliest, latest);
            }
        }
        RecordCommand::Estimate { record, json, no_save, min_observations } => {
            let config = EstimatorConfig {
                min_observations,
                persist: !no_save,
            };
            let outcome = CompletionEstimator::new(&*storage, config)
                .estimate_record(record)
                .await?;
            let record = require_record(storage, record).await?;

            if json {
                let report = EstimateReport::new(&record, &outcome);
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", estimate_banner(&record, &outcome));
            }
            if let Some(e) = outcome.persistence_error() {
                eprintln!("Warning: {}", e);
            }
        }
    }

    Ok(())
}

fn run_worksheet(action: WorksheetCommand) -> Result<()> {
    match action {
        WorksheetCommand::New { title, start_date, pages, days, out } => {
            let path = out.unwrap_or_else(|| PathBuf::from(worksheet_file_name(&title)));
            let file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            write_blank(file, &title, start_date, pages, days)?;

            println!("Book Title={}", title);
            println!("File Name={}", path.display());
            println!("Start Date={}", fmt_date(start_date));
        }
        WorksheetCommand::Estimate { file } => {
            let sheet = Worksheet::from_path(&file)?;
            let result = sheet.estimate()?;

            let divider = "*".repeat(80);
            println!("{}", divider);
            println!("              Book: {}", sheet.title);
            println!(
                "Estimated Complete: {}  Earliest: {}  Latest: {}",
                fmt_date(result.likely_date),
                fmt_date(result.earliest_date),
                fmt_date(result.latest_date)
            );
            println!("{}", divider);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use booktrack_core::BookTarget;
    use booktrack_progress::estimate_offsets;

    fn date(s: &str) -> Date {
        Date::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn sample() -> (ReadingRecord, EstimateOutcome) {
        let mut record = ReadingRecord::new("Command and Control", date("2022-02-01"))
            .with_author("Schlosser, Eric")
            .with_total_pages(1000.0);
        for (d, p) in [("2022-02-01", 0), ("2022-02-03", 40), ("2022-02-09", 279)] {
            record.add_observation(Observation::new(date(d), p));
        }

        let target = BookTarget::new(record.start_date, 1000.0);
        let offsets = estimate_offsets(&record.observations, &target).unwrap();
        let outcome = EstimateOutcome {
            record_id: record.id,
            result: offsets.project().unwrap(),
            offsets,
            target,
            computed_at: chrono::Utc::now(),
            persistence: Persistence::Saved,
        };
        (record, outcome)
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let id = RecordId::new().to_string();
        let args = ["booktrack", "pages", id.as_str(), "40", "--date", "2022-02-03"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Record(RecordCommand::Pages { page, date: Some(d), .. }) => {
                assert_eq!(page, 40);
                assert_eq!(d, date("2022-02-03"));
            }
            _ => panic!("expected pages command"),
        }

        assert!(Cli::try_parse_from(["booktrack", "pages", "nope", "40"]).is_err());
    }

    #[test]
    fn test_page_count_must_be_positive() {
        for bad in ["0", "-3", "NaN", "inf", "lots"] {
            assert!(parse_page_count(bad).is_err(), "{} accepted", bad);
        }
        assert_eq!(parse_page_count("412").unwrap(), 412.0);
        assert_eq!(parse_page_count("99.5").unwrap(), 99.5);

        let id = RecordId::new().to_string();
        assert!(Cli::try_parse_from(["booktrack", "set-pages", id.as_str(), "0"]).is_err());
        assert!(Cli::try_parse_from(["booktrack", "start", "Dune", "--pages=-3"]).is_err());
        assert!(Cli::try_parse_from(["booktrack", "start", "Dune", "--pages", "NaN"]).is_err());

        let cli = Cli::try_parse_from(["booktrack", "start", "Dune", "--pages", "412"]).unwrap();
        match cli.command {
            Commands::Record(RecordCommand::Start { pages, .. }) => assert_eq!(pages, Some(412.0)),
            _ => panic!("expected start command"),
        }
    }

    #[test]
    fn test_estimate_banner() {
        let (record, outcome) = sample();
        let banner = estimate_banner(&record, &outcome);
        let lines: Vec<&str> = banner.lines().collect();

        assert_eq!(lines[0], "*".repeat(72));
        assert_eq!(lines[1], "\"Command and Control\" by Schlosser, Eric has 1000 pages.");
        assert_eq!(lines[3], "\"Command and Control\" estimated finish on 2022-02-28.");
        assert_eq!(lines[4], "  Earliest: 2022-02-27 Latest: 2022-03-17.");
    }

    #[test]
    fn test_json_report() {
        let (record, outcome) = sample();
        let json = serde_json::to_value(EstimateReport::new(&record, &outcome)).unwrap();

        assert_eq!(json["likely_date"], "2022-02-28");
        assert_eq!(json["estimate"][2], "2022-03-17");
        assert_eq!(json["saved"], true);
        assert_eq!(json["record_id"], record.id.to_string());
    }
}

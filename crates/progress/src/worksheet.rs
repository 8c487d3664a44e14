//! Standalone reading worksheets.
//!
//! A worksheet is a small CSV file filled in by hand while reading:
//!
//! ```text
//! "Command and Control", 1000
//! 2022-02-01,0
//! 2022-02-02,
//! 2022-02-03,40
//! # 2022-02-04,skipped
//! ```
//!
//! The first row names the book and its readable page count; each later row
//! is a date and the page reached. Rows with an empty page or a first field
//! starting with `#` are ignored.

use std::io::Write;
use std::path::Path;

use booktrack_core::{BookTarget, Date, EstimateResult, Observation, DATE_FORMAT};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

use crate::estimator::{estimate, MIN_OBSERVATIONS};
use crate::{EstimateError, Result};

/// A parsed worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    /// Book title
    pub title: String,
    /// Readable page count
    pub total_pages: f64,
    /// Filled-in observations, in file order
    pub observations: Vec<Observation>,
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

impl Worksheet {
    /// Parse worksheet text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let header = records
            .next()
            .transpose()?
            .ok_or_else(|| EstimateError::Worksheet("worksheet is empty".into()))?;

        let title = header.get(0).unwrap_or_default().to_string();
        let total_pages = header
            .get(1)
            .and_then(|p| p.parse::<f64>().ok())
            .ok_or_else(|| {
                EstimateError::Worksheet(format!(
                    "line {}: header must be \"<title>\", <pages>",
                    line_of(&header)
                ))
            })?;

        let mut observations = Vec::new();
        for record in records {
            let record = record?;
            let first = record.get(0).unwrap_or_default();
            let page = record.get(1).unwrap_or_default();
            if first.starts_with('#') || page.is_empty() {
                continue;
            }

            let line = line_of(&record);
            let date = Date::parse_from_str(first, DATE_FORMAT).map_err(|e| {
                EstimateError::Worksheet(format!("line {}: bad date {:?}: {}", line, first, e))
            })?;
            let page = page.parse::<u32>().map_err(|e| {
                EstimateError::Worksheet(format!("line {}: bad page {:?}: {}", line, page, e))
            })?;
            observations.push(Observation::new(date, page));
        }

        Ok(Self {
            title,
            total_pages,
            observations,
        })
    }

    /// Read and parse a worksheet file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EstimateError::Worksheet(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Target anchored at the first filled-in row.
    pub fn target(&self) -> Option<BookTarget> {
        let first = self.observations.first()?;
        let target = BookTarget::new(first.date, self.total_pages);
        target.is_usable().then_some(target)
    }

    /// Estimate completion from the filled-in rows.
    ///
    /// The row count is checked before the page count.
    pub fn estimate(&self) -> Result<EstimateResult> {
        if self.observations.len() < MIN_OBSERVATIONS {
            return Err(EstimateError::InsufficientReadingData {
                found: self.observations.len(),
                required: MIN_OBSERVATIONS,
            });
        }
        let target = self.target().ok_or(EstimateError::InsufficientBookData)?;
        estimate(&self.observations, &target)
    }
}

/// Write a blank worksheet with `days` consecutive dated rows.
///
/// The header is always written as `"<title>", <pages>`.
pub fn write_blank<W: Write>(
    mut writer: W,
    title: &str,
    start_date: Date,
    total_pages: u32,
    days: u32,
) -> Result<()> {
    writeln!(writer, "\"{}\", {}", title.replace('"', "\"\""), total_pages)
        .map_err(|e| EstimateError::Worksheet(format!("cannot write worksheet: {}", e)))?;

    let mut out = WriterBuilder::new().flexible(true).from_writer(writer);

    for date in start_date.iter_days().take(days as usize) {
        out.write_record([date.format(DATE_FORMAT).to_string().as_str(), ""])?;
    }

    out.flush()
        .map_err(|e| EstimateError::Worksheet(format!("cannot write worksheet: {}", e)))
}

/// Worksheet file name for a title: lowercase, spaces to underscores.
pub fn worksheet_file_name(title: &str) -> String {
    format!("{}.txt", title.trim().to_lowercase().replace(' ', "_"))
}

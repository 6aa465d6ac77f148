//! CSV export of a roster listing.
//!
//! The file opens in spreadsheet software without an import dialog: UTF-8
//! with a byte-order mark, a fixed Korean header and every value quoted.

use crate::types::{ListKind, RegistrantView};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use roster_web::AppError;
use thiserror::Error;

/// Header row of every export.
pub const HEADER: &str = "이름,학번,전화번호,학교 구분,기숙사/야자,기숙사/야자 번호,이벤트 ID,신청 시간";

const BOM: &str = "\u{feff}";
const MISSING: &str = "-";
const DEFAULT_AFFILIATION: &str = "기타";

/// Failure to produce the file.
#[derive(Error, Debug)]
pub enum ExportError {
    /// A row could not be written
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    /// The writer could not be flushed
    #[error("CSV flush failed: {0}")]
    Flush(String),
}

impl From<ExportError> for AppError {
    fn from(error: ExportError) -> Self {
        Self::internal(error.to_string()).with_code("EXPORT_FAILED")
    }
}

/// A rendered export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvExport {
    /// Suggested download name
    pub filename: String,
    /// File contents, BOM included
    pub bytes: Vec<u8>,
}

/// Renders listings in a fixed time zone.
#[derive(Clone, Copy, Debug)]
pub struct CsvExporter {
    offset: FixedOffset,
}

impl CsvExporter {
    /// Exporter rendering times at `offset`.
    #[must_use]
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Exporter for a whole-hour offset from UTC; out-of-range values fall
    /// back to UTC.
    #[must_use]
    pub fn with_utc_offset_hours(hours: i32) -> Self {
        let offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self { offset }
    }

    /// `신청자_목록_2025-07-19.csv` style name for `list` exported at `now`.
    #[must_use]
    pub fn filename(&self, list: ListKind, now: DateTime<Utc>) -> String {
        let date = now.with_timezone(&self.offset).format("%Y-%m-%d");
        format!("{}_{date}.csv", list.export_prefix())
    }

    /// Submission time as local wall-clock text.
    #[must_use]
    pub fn format_timestamp(&self, millis: i64) -> String {
        DateTime::<Utc>::from_timestamp_millis(millis).map_or_else(
            || MISSING.to_string(),
            |time| {
                time.with_timezone(&self.offset)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
    }

    /// Render `rows` as a file for `list`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] if the CSV writer fails.
    pub fn export(
        &self,
        list: ListKind,
        rows: &[RegistrantView],
        now: DateTime<Utc>,
    ) -> Result<CsvExport, ExportError> {
        let mut buffer = Vec::with_capacity(BOM.len() + HEADER.len() + rows.len() * 96);
        buffer.extend_from_slice(BOM.as_bytes());
        buffer.extend_from_slice(HEADER.as_bytes());
        buffer.push(b'\n');

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(buffer);

        for row in rows {
            writer.write_record(self.fields(row))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|error| ExportError::Flush(error.error().to_string()))?;

        tracing::debug!(list = %list, rows = rows.len(), "Export rendered");
        Ok(CsvExport {
            filename: self.filename(list, now),
            bytes,
        })
    }

    fn fields(&self, row: &RegistrantView) -> [String; 8] {
        let or_missing = |value: &str| {
            if value.is_empty() {
                MISSING.to_string()
            } else {
                value.to_string()
            }
        };

        [
            row.name.clone(),
            row.student_id.clone(),
            row.phone.clone(),
            row.affiliation
                .map_or(DEFAULT_AFFILIATION, |affiliation| affiliation.as_str())
                .to_string(),
            row.residence.as_str().to_string(),
            or_missing(&row.residence_phone),
            or_missing(&row.event_id),
            self.format_timestamp(row.timestamp),
        ]
    }
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::with_utc_offset_hours(9)
    }
}

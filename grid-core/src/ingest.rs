//! eDNA export parsing.
//!
//! Each record is `signal_id, timestamp, value, status, ...`. Records with fewer than
//! [`EdnaLineParser::MIN_FIELDS`] fields are skipped. Timestamps that do not match the
//! configured format are zero-filled to the Unix epoch instead of rejecting the record.

use crate::{GridError, Reading, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::{ByteRecord, ReaderBuilder};
use std::io::Read;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct EdnaLineParser {
    timestamp_format: String,
}

impl EdnaLineParser {
    pub const MIN_FIELDS: usize = 5;

    pub fn new(timestamp_format: impl Into<String>) -> Self {
        Self {
            timestamp_format: timestamp_format.into(),
        }
    }

    /// Parse a timestamp, reporting whether it had to be zero-filled.
    pub fn parse_timestamp(&self, raw: &str) -> (DateTime<Utc>, bool) {
        match NaiveDateTime::parse_from_str(clean(raw), &self.timestamp_format) {
            Ok(naive) => (Utc.from_utc_datetime(&naive), false),
            Err(e) => {
                trace!("Unparseable timestamp {:?}: {}", raw, e);
                (DateTime::<Utc>::default(), true)
            }
        }
    }

    /// Build a reading from one record's fields, reporting whether its timestamp was
    /// zero-filled. `None` when the record is too short.
    pub fn parse_fields<'a, I>(&self, fields: I) -> Option<(Reading, bool)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields: Vec<&str> = fields.into_iter().collect();
        if fields.len() < Self::MIN_FIELDS {
            return None;
        }

        let (timestamp, zero_filled) = self.parse_timestamp(fields[1]);
        let reading = Reading::new(
            clean(fields[0]),
            timestamp,
            clean(fields[2]),
            clean(fields[3]),
        );
        Some((reading, zero_filled))
    }

    pub fn readings<R: Read>(&self, reader: R) -> ReadingSource<R> {
        ReadingSource::new(self.clone(), reader)
    }
}

fn clean(field: &str) -> &str {
    field.trim().trim_matches('"')
}

/// Iterator over the readings of one input unit.
pub struct ReadingSource<R: Read> {
    parser: EdnaLineParser,
    reader: csv::Reader<R>,
    record: ByteRecord,
    stats: IngestStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records: usize,
    pub readings: usize,
    pub skipped: usize,
    pub zero_filled_timestamps: usize,
}

impl<R: Read> ReadingSource<R> {
    pub fn new(parser: EdnaLineParser, reader: R) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        Self {
            parser,
            reader,
            record: ByteRecord::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    fn report_exhausted(&self) {
        let stats = &self.stats;
        if stats.skipped > 0 || stats.zero_filled_timestamps > 0 {
            warn!(
                records = stats.records,
                skipped = stats.skipped,
                zero_filled = stats.zero_filled_timestamps,
                "Input had malformed records"
            );
        } else {
            debug!(records = stats.records, "Input exhausted");
        }
    }
}

impl<R: Read> Iterator for ReadingSource<R> {
    type Item = Result<Reading>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_byte_record(&mut self.record) {
                Ok(false) => {
                    self.report_exhausted();
                    return None;
                }
                Ok(true) => {}
                Err(e) => return Some(Err(GridError::from(e))),
            }

            self.stats.records += 1;
            let fields: Vec<String> = self
                .record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect();

            let Some((reading, zero_filled)) =
                self.parser.parse_fields(fields.iter().map(String::as_str))
            else {
                self.stats.skipped += 1;
                continue;
            };
            if zero_filled {
                self.stats.zero_filled_timestamps += 1;
            }

            self.stats.readings += 1;
            return Some(Ok(reading));
        }
    }
}

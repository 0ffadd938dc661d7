//! CSV file data adapter.
//!
//! One file per symbol and frequency, `{symbol}_{frequency}.csv`, with a
//! header row `date,open,high,low,close,volume`. Dates are `YYYY-MM-DD` or
//! `YYYY-MM-DD HH:MM:SS`. Empty price or volume cells load as NaN.

use crate::domain::error::QuantError;
use crate::domain::ohlcv::{OhlcvBar, PriceTable};
use crate::domain::strategy::Frequency;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, frequency: Frequency) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", symbol, frequency.label()))
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, QuantError> {
    let raw = record.get(index).ok_or_else(|| QuantError::Data {
        reason: format!("missing {} column", name),
    })?;
    if raw.trim().is_empty() {
        return Ok(f64::NAN);
    }
    raw.trim().parse().map_err(|e| QuantError::Data {
        reason: format!("invalid {} value '{}': {}", name, raw, e),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_table(
        &self,
        symbol: &str,
        frequency: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, QuantError> {
        let path = self.csv_path(symbol, frequency);
        let content = fs::read_to_string(&path).map_err(|e| QuantError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| QuantError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str = record.get(0).ok_or_else(|| QuantError::Data {
                reason: "missing date column".into(),
            })?;
            let timestamp = parse_timestamp(date_str).ok_or_else(|| QuantError::Data {
                reason: format!("invalid date '{}'", date_str),
            })?;

            let date = timestamp.date();
            if date < start || date > end {
                continue;
            }

            bars.push(OhlcvBar {
                timestamp,
                open: field(&record, 1, "open")?,
                high: field(&record, 2, "high")?,
                low: field(&record, 3, "low")?,
                close: field(&record, 4, "close")?,
                volume: field(&record, 5, "volume")?,
            });
        }

        if bars.is_empty() {
            return Err(QuantError::NoData {
                symbol: symbol.to_string(),
                frequency: frequency.to_string(),
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        tracing::debug!(symbol, %frequency, bars = bars.len(), "loaded price table");
        PriceTable::from_bars(&bars)
    }

    fn available_frequencies(&self, symbol: &str) -> Result<Vec<Frequency>, QuantError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| QuantError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let prefix = format!("{}_", symbol);
        let mut frequencies = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| QuantError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(label) = name_str
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".csv"))
            {
                if let Some(f) = Frequency::parse(label) {
                    frequencies.push(f);
                }
            }
        }

        frequencies.sort();
        Ok(frequencies)
    }
}

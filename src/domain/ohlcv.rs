//! OHLCV bars and the column-oriented price table the engine evaluates over.

use crate::domain::error::QuantError;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Names of the built-in price columns, in table order.
pub const PRICE_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

pub fn is_price_column(name: &str) -> bool {
    PRICE_COLUMNS.contains(&name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Time-indexed OHLCV columns with strictly increasing timestamps.
///
/// Extra named columns hold series that were materialized outside the
/// engine (for example a second asset's close). They are looked up by name
/// before any indicator is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    index: Vec<NaiveDateTime>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    extra: BTreeMap<String, Vec<f64>>,
}

impl PriceTable {
    pub fn from_bars(bars: &[OhlcvBar]) -> Result<Self, QuantError> {
        let index: Vec<NaiveDateTime> = bars.iter().map(|b| b.timestamp).collect();
        check_index(&index)?;
        Ok(Self {
            index,
            open: bars.iter().map(|b| b.open).collect(),
            high: bars.iter().map(|b| b.high).collect(),
            low: bars.iter().map(|b| b.low).collect(),
            close: bars.iter().map(|b| b.close).collect(),
            volume: bars.iter().map(|b| b.volume).collect(),
            extra: BTreeMap::new(),
        })
    }

    /// Builds a table where open/high/low equal close and volume is zero.
    pub fn from_closes(index: Vec<NaiveDateTime>, close: Vec<f64>) -> Result<Self, QuantError> {
        if index.len() != close.len() {
            return Err(QuantError::alignment(format!(
                "index has {} rows but close has {}",
                index.len(),
                close.len()
            )));
        }
        check_index(&index)?;
        Ok(Self {
            open: close.clone(),
            high: close.clone(),
            low: close.clone(),
            volume: vec![0.0; close.len()],
            close,
            index,
            extra: BTreeMap::new(),
        })
    }

    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self, QuantError> {
        if values.len() != self.len() {
            return Err(QuantError::alignment(format!(
                "column '{}' has {} rows, table has {}",
                name,
                values.len(),
                self.len()
            )));
        }
        if is_price_column(name) {
            return Err(QuantError::alignment(format!(
                "column '{}' shadows a price column",
                name
            )));
        }
        self.extra.insert(name.to_string(), values);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn open(&self) -> &[f64] {
        &self.open
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    /// One of the five OHLCV columns, by its capitalized name.
    pub fn price_column(&self, name: &str) -> Option<&[f64]> {
        match name {
            "Open" => Some(&self.open),
            "High" => Some(&self.high),
            "Low" => Some(&self.low),
            "Close" => Some(&self.close),
            "Volume" => Some(&self.volume),
            _ => None,
        }
    }

    /// A price column or an extra materialized column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.price_column(name)
            .or_else(|| self.extra.get(name).map(|v| v.as_slice()))
    }

    pub fn typical_price(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| (self.high[i] + self.low[i] + self.close[i]) / 3.0)
            .collect()
    }

    /// True when at least one calendar day holds more than one bar.
    pub fn is_intraday(&self) -> bool {
        self.index.windows(2).any(|w| w[0].date() == w[1].date())
    }
}

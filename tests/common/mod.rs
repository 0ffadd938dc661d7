#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use quantlab::domain::error::QuantError;
pub use quantlab::domain::ohlcv::{OhlcvBar, PriceTable};
use quantlab::domain::strategy::{Frequency, StrategySpec};
use quantlab::ports::data_port::DataPort;
use std::collections::HashMap;

/// In-memory data port keyed by (symbol, frequency).
pub struct MockDataPort {
    pub data: HashMap<(String, Frequency), Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, frequency: Frequency, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert((symbol.to_string(), frequency), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_table(
        &self,
        symbol: &str,
        frequency: Frequency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceTable, QuantError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(QuantError::Data {
                reason: reason.clone(),
            });
        }
        let bars: Vec<OhlcvBar> = self
            .data
            .get(&(symbol.to_string(), frequency))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp.date() >= start && b.timestamp.date() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(QuantError::NoData {
                symbol: symbol.to_string(),
                frequency: frequency.to_string(),
            });
        }
        PriceTable::from_bars(&bars)
    }

    fn available_frequencies(&self, symbol: &str) -> Result<Vec<Frequency>, QuantError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(QuantError::Data {
                reason: reason.clone(),
            });
        }
        let mut out: Vec<Frequency> = self
            .data
            .keys()
            .filter(|(s, _)| s == symbol)
            .map(|(_, f)| *f)
            .collect();
        out.sort();
        Ok(out)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn midnight(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_opt(0, 0, 0).unwrap()
}

pub fn make_bar(timestamp: NaiveDateTime, close: f64) -> OhlcvBar {
    OhlcvBar {
        timestamp,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000.0,
    }
}

/// Bars spaced by `step` with the given closes.
pub fn bars_from_closes(start: NaiveDateTime, step: Duration, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| make_bar(start + step * i as i32, *c))
        .collect()
}

pub fn daily_table(start: NaiveDate, closes: &[f64]) -> PriceTable {
    PriceTable::from_bars(&bars_from_closes(midnight(start), Duration::days(1), closes)).unwrap()
}

/// Deterministic zig-zag around an upward drift.
pub fn wavy_closes(n: usize, start_price: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            start_price + 0.3 * x + 5.0 * (x / 6.0).sin()
        })
        .collect()
}

pub fn fixed_spec(name: &str, entry: &str, exit: &str) -> StrategySpec {
    StrategySpec::new(name, entry, exit)
}

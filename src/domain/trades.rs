//! Round-trip trade reconstruction from a position series.
//!
//! A trade is a maximal run of non-zero position. Fills inside the run are
//! classified against the run's opening direction: deltas that add exposure
//! are entries, deltas that remove it are exits. The bar where the position
//! returns to zero is the closing fill. Prices are delta-weighted closes.

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeType {
    Long,
    Short,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub strategy: String,
    pub entry_date: NaiveDateTime,
    pub exit_date: NaiveDateTime,
    pub avg_entry_price: Option<f64>,
    pub avg_exit_price: Option<f64>,
    /// Total magnitude entered over the run.
    pub position: f64,
    pub trade_return: Option<f64>,
    pub trade_type: TradeType,
    /// Still held at the last bar; exit is marked at the last close.
    pub is_open: bool,
    #[serde(skip)]
    pub entry_index: usize,
    /// Bars with non-zero position, starting at `entry_index`.
    #[serde(skip)]
    pub bars_held: usize,
}

#[derive(Default)]
struct Fills {
    quantity: f64,
    notional: f64,
}

impl Fills {
    fn add(&mut self, quantity: f64, price: f64) {
        self.quantity += quantity;
        self.notional += quantity * price;
    }

    fn average(&self) -> Option<f64> {
        if self.quantity == 0.0 {
            return None;
        }
        let avg = self.notional / self.quantity;
        avg.is_finite().then_some(avg)
    }
}

/// Reconstructs trades from `position` and `close` observed on `index`.
/// NaN positions are treated as flat.
pub fn reconstruct_trades(
    strategy: &str,
    index: &[NaiveDateTime],
    position: &[f64],
    close: &[f64],
) -> Vec<Trade> {
    let n = index.len().min(position.len()).min(close.len());
    let pos = |i: usize| if position[i].is_nan() { 0.0 } else { position[i] };

    let mut trades = Vec::new();
    let mut i = 0;
    while i < n {
        if pos(i) == 0.0 {
            i += 1;
            continue;
        }
        let start = i;
        let direction = pos(start).signum();
        let mut entries = Fills::default();
        let mut exits = Fills::default();
        let mut previous = if start == 0 { 0.0 } else { pos(start - 1) };

        while i < n && pos(i) != 0.0 {
            let signed = (pos(i) - previous) * direction;
            if signed > 0.0 {
                entries.add(signed, close[i]);
            } else if signed < 0.0 {
                exits.add(-signed, close[i]);
            }
            previous = pos(i);
            i += 1;
        }

        let is_open = i == n;
        let exit_at = if is_open { n - 1 } else { i };
        exits.add((previous * direction).abs(), close[exit_at]);

        let avg_entry_price = entries.average();
        let avg_exit_price = exits.average();
        let trade_return = match (avg_entry_price, avg_exit_price) {
            (Some(entry), Some(exit)) => {
                let r = direction * (exit - entry) / entry;
                r.is_finite().then_some(r)
            }
            _ => None,
        };

        trades.push(Trade {
            strategy: strategy.to_string(),
            entry_date: index[start],
            exit_date: index[exit_at],
            avg_entry_price,
            avg_exit_price,
            position: entries.quantity,
            trade_return,
            trade_type: if direction > 0.0 {
                TradeType::Long
            } else {
                TradeType::Short
            },
            is_open,
            entry_index: start,
            bars_held: i - start,
        });
    }
    trades
}

//! Average absolute move from the daily open at the same time of day.
//!
//! For a bar on day `d` at time `t`, averages `|close / open(day) - 1|` over
//! the bars at time `t` on the previous `window` days of the table. The
//! current day never contributes, so the value is known at the bar's open.

use crate::domain::ohlcv::PriceTable;
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;

pub fn calculate_average_move_from_open(table: &PriceTable, window: usize) -> Vec<f64> {
    let index = table.index();
    let open = table.open();
    let close = table.close();

    let mut days: Vec<NaiveDate> = Vec::new();
    let mut day_of_bar = Vec::with_capacity(table.len());
    let mut day_open: Vec<f64> = Vec::new();
    for (i, ts) in index.iter().enumerate() {
        if days.last() != Some(&ts.date()) {
            days.push(ts.date());
            day_open.push(open[i]);
        }
        day_of_bar.push(days.len() - 1);
    }

    let mut moves: HashMap<(usize, NaiveTime), f64> = HashMap::with_capacity(table.len());
    for (i, ts) in index.iter().enumerate() {
        let d = day_of_bar[i];
        moves.insert((d, ts.time()), (close[i] / day_open[d] - 1.0).abs());
    }

    index
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            let d = day_of_bar[i];
            let first = d.saturating_sub(window);
            let observed: Vec<f64> = (first..d)
                .filter_map(|prev| moves.get(&(prev, ts.time())).copied())
                .filter(|m| !m.is_nan())
                .collect();
            if observed.is_empty() {
                f64::NAN
            } else {
                observed.iter().sum::<f64>() / observed.len() as f64
            }
        })
        .collect()
}

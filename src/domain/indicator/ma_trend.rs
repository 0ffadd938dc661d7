//! Trend of a moving average: the percent change of SMA(ma_window) over
//! `return_window` periods, shifted one period.

use crate::domain::indicator::window::{pct_change, rolling_mean, shift};

pub fn calculate_ma_trend(series: &[f64], ma_window: usize, return_window: usize) -> Vec<f64> {
    let ma = rolling_mean(series, ma_window);
    shift(&pct_change(&ma, return_window), 1)
}

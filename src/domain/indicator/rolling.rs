//! Rolling extrema of the previous `window` closed periods.

use crate::domain::indicator::window::{rolling_max, rolling_min, shift};

pub fn calculate_rolling_high(series: &[f64], window: usize) -> Vec<f64> {
    shift(&rolling_max(series, window), 1)
}

pub fn calculate_rolling_low(series: &[f64], window: usize) -> Vec<f64> {
    shift(&rolling_min(series, window), 1)
}

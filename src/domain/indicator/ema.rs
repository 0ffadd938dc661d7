//! Exponential Moving Average.
//!
//! k = 2/(n+1), seeded with the first observation, then
//! EMA[i] = x[i]*k + EMA[i-1]*(1-k). The result is shifted one period so the
//! value at bar t only reflects bars before t.

use crate::domain::indicator::window::{ewm_mean_recursive, shift};

pub fn calculate_ema(series: &[f64], window: usize) -> Vec<f64> {
    shift(&ewm_mean_recursive(series, window), 1)
}

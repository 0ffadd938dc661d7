//! Simple Moving Average over the previous `window` closed periods.
//!
//! SMA(n)[t] = mean(x[t-n..t-1]). NaN until `n` prior values exist.

use crate::domain::indicator::window::{rolling_mean, shift};

pub fn calculate_sma(series: &[f64], window: usize) -> Vec<f64> {
    shift(&rolling_mean(series, window), 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_warmup_includes_shift() {
        let s = calculate_sma(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert!(s[..3].iter().all(|v| v.is_nan()));
        assert!((s[3] - 20.0).abs() < 1e-9);
        assert!((s[4] - 30.0).abs() < 1e-9);
    }

    #[test]
    fn sma_ignores_current_bar() {
        let a = calculate_sma(&[1.0, 2.0, 3.0, 4.0], 2);
        let b = calculate_sma(&[1.0, 2.0, 3.0, 1000.0], 2);
        assert!((a[3] - b[3]).abs() < 1e-9);
    }

    #[test]
    fn sma_empty() {
        assert!(calculate_sma(&[], 3).is_empty());
    }
}

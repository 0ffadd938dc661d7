//! Position sizing.
//!
//! Turns a strategy's sizing method into a per-bar size series. All values
//! are fractions (`0.2` is 20 %). The final series is clipped to
//! `max_leverage` and any remaining NaN becomes `min(1, max_leverage)`; the
//! signal decides whether a position exists at all.

use crate::domain::indicator::window::{ewm_mean, ewm_std, pct_change, shift};

/// Default EWM span for volatility targeting.
pub const DEFAULT_VOLATILITY_LOOKBACK: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub enum PositionSizing {
    Fixed {
        fraction: f64,
    },
    VolatilityTarget {
        target: f64,
        lookback: usize,
        buffer: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingConfig {
    pub method: PositionSizing,
    pub allocation: f64,
    pub max_leverage: f64,
}

impl SizingConfig {
    /// Size series aligned to `close`.
    pub fn sizes(&self, close: &[f64], periods_per_year: f64) -> Vec<f64> {
        let raw = match &self.method {
            PositionSizing::Fixed { fraction } => {
                let size = fraction * self.allocation;
                if size > self.max_leverage {
                    tracing::warn!(
                        size,
                        max_leverage = self.max_leverage,
                        "fixed position size exceeds max leverage; clipping"
                    );
                }
                vec![size; close.len()]
            }
            PositionSizing::VolatilityTarget {
                target,
                lookback,
                buffer,
            } => {
                let target = target * self.allocation;
                let estimate = volatility_estimate(close, *lookback, periods_per_year);
                let raw: Vec<f64> = estimate.iter().map(|v| target / v).collect();
                match buffer {
                    Some(b) if *b > 0.0 => apply_buffer(&raw, &estimate, target, *b),
                    _ => raw,
                }
            }
        };
        self.finish(raw)
    }

    fn finish(&self, raw: Vec<f64>) -> Vec<f64> {
        let fill = self.max_leverage.min(1.0);
        raw.into_iter()
            .map(|s| if s.is_nan() { fill } else { s.min(self.max_leverage) })
            .collect()
    }
}

/// Annualized realized volatility, smoothed a second time.
///
/// realized[t] = ewm_std(returns, span)[t-1] * sqrt(periods_per_year)
/// estimate[t] = ewm_mean(realized, span)[t-1]
pub fn volatility_estimate(close: &[f64], lookback: usize, periods_per_year: f64) -> Vec<f64> {
    let returns = pct_change(close, 1);
    let annualize = periods_per_year.sqrt();
    let realized: Vec<f64> = shift(&ewm_std(&returns, lookback), 1)
        .into_iter()
        .map(|v| v * annualize)
        .collect();
    shift(&ewm_mean(&realized, lookback), 1)
}

/// Adopts a new size only when the previous bar's estimate deviates from the
/// target by more than `buffer` (relative); otherwise the last adopted size
/// carries forward. The first finite size is always adopted.
fn apply_buffer(raw: &[f64], estimate: &[f64], target: f64, buffer: f64) -> Vec<f64> {
    let prior = shift(estimate, 1);
    let mut out = Vec::with_capacity(raw.len());
    let mut held = f64::NAN;
    for (i, &size) in raw.iter().enumerate() {
        let deviation = (prior[i] - target).abs() / target;
        if !size.is_nan() && (held.is_nan() || deviation > buffer) {
            held = size;
        }
        out.push(held);
    }
    out
}

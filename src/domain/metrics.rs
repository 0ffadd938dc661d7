//! Performance metrics.
//!
//! Every field is `Option`: a value that is undefined for the input (empty
//! series, zero denominator, non-finite result) serializes as `null`.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Default starting portfolio value for the value-based fields.
pub const DEFAULT_INITIAL_VALUE: f64 = 10_000.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsBundle {
    #[serde(rename = "Start Date")]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "End Date")]
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "Initial Value")]
    pub initial_value: Option<f64>,
    #[serde(rename = "End Value")]
    pub end_value: Option<f64>,
    #[serde(rename = "Max Value")]
    pub max_value: Option<f64>,
    #[serde(rename = "Min Value")]
    pub min_value: Option<f64>,
    #[serde(rename = "Total Return")]
    pub total_return: Option<f64>,
    #[serde(rename = "Annualized Return")]
    pub annualized_return: Option<f64>,
    #[serde(rename = "Volatility")]
    pub volatility: Option<f64>,
    #[serde(rename = "Sharpe Ratio")]
    pub sharpe_ratio: Option<f64>,
    #[serde(rename = "Max Drawdown")]
    pub max_drawdown: Option<f64>,
    #[serde(rename = "Average Drawdown")]
    pub avg_drawdown: Option<f64>,
    #[serde(rename = "Win Rate")]
    pub win_rate: Option<f64>,
    #[serde(rename = "Loss Rate")]
    pub loss_rate: Option<f64>,
    #[serde(rename = "Average Win")]
    pub avg_win: Option<f64>,
    #[serde(rename = "Average Loss")]
    pub avg_loss: Option<f64>,
    #[serde(rename = "Profit Factor")]
    pub profit_factor: Option<f64>,
    #[serde(rename = "Sortino Ratio")]
    pub sortino_ratio: Option<f64>,
    #[serde(rename = "Calmar Ratio")]
    pub calmar_ratio: Option<f64>,
    #[serde(rename = "Best Month")]
    pub best_month: Option<f64>,
    #[serde(rename = "Worst Month")]
    pub worst_month: Option<f64>,
    #[serde(rename = "Number of Trades")]
    pub num_trades: Option<usize>,
    #[serde(rename = "Exposure (%)")]
    pub exposure_pct: Option<f64>,
    #[serde(rename = "Max Consecutive Wins")]
    pub max_consecutive_wins: Option<usize>,
    #[serde(rename = "Max Consecutive Losses")]
    pub max_consecutive_losses: Option<usize>,
    #[serde(rename = "Average Trade Duration (days)")]
    pub avg_holding_period: Option<f64>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation (n - 1); NaN below two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

impl MetricsBundle {
    /// Computes the bundle for `returns` and `positions` observed on `dates`.
    /// NaN returns count as zero; NaN positions as flat.
    pub fn compute(
        returns: &[f64],
        positions: &[f64],
        dates: &[NaiveDate],
        periods_per_year: f64,
        initial_value: f64,
    ) -> Self {
        let mut m = MetricsBundle {
            initial_value: finite(initial_value),
            ..Default::default()
        };
        if returns.is_empty() {
            return m;
        }
        let returns: Vec<f64> = returns
            .iter()
            .map(|r| if r.is_nan() { 0.0 } else { *r })
            .collect();
        let n = returns.len() as f64;

        let mut cum = Vec::with_capacity(returns.len());
        let mut acc = 1.0;
        for r in &returns {
            acc *= 1.0 + r;
            cum.push(acc);
        }
        let total_return = acc - 1.0;
        let annualized = (1.0 + total_return).powf(periods_per_year / n) - 1.0;
        let volatility = sample_std(&returns) * periods_per_year.sqrt();

        m.start_date = dates.first().copied();
        m.end_date = dates.last().copied();
        m.end_value = finite(initial_value * (1.0 + total_return));
        m.max_value = finite(initial_value * cum.iter().cloned().fold(f64::NEG_INFINITY, f64::max));
        m.min_value = finite(initial_value * cum.iter().cloned().fold(f64::INFINITY, f64::min));
        m.total_return = finite(total_return);
        m.annualized_return = finite(annualized);
        m.volatility = finite(volatility);
        m.sharpe_ratio = if volatility == 0.0 {
            Some(0.0)
        } else {
            finite(annualized / volatility)
        };

        let mut peak = f64::NEG_INFINITY;
        let drawdowns: Vec<f64> = cum
            .iter()
            .map(|&c| {
                peak = peak.max(c);
                1.0 - c / peak
            })
            .collect();
        let max_drawdown = drawdowns.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        m.max_drawdown = finite(max_drawdown);
        m.avg_drawdown = finite(mean(&drawdowns));

        let wins: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        m.win_rate = Some(wins.len() as f64 / n);
        m.loss_rate = Some(losses.len() as f64 / n);
        m.avg_win = Some(if wins.is_empty() { 0.0 } else { mean(&wins) });
        m.avg_loss = Some(if losses.is_empty() { 0.0 } else { mean(&losses) });
        let loss_sum: f64 = losses.iter().sum();
        m.profit_factor = if loss_sum != 0.0 {
            finite((wins.iter().sum::<f64>() / loss_sum).abs())
        } else {
            None
        };
        m.sortino_ratio = finite(annualized / (sample_std(&losses) * periods_per_year.sqrt()));
        m.calmar_ratio = if max_drawdown != 0.0 {
            finite(annualized / max_drawdown)
        } else {
            None
        };

        let monthly = monthly_returns(&returns, dates);
        m.best_month = monthly.iter().cloned().reduce(f64::max).and_then(finite);
        m.worst_month = monthly.iter().cloned().reduce(f64::min).and_then(finite);

        let positions: Vec<f64> = positions
            .iter()
            .map(|p| if p.is_nan() { 0.0 } else { *p })
            .collect();
        m.num_trades = Some(positions.windows(2).filter(|w| w[1] != w[0]).count());
        if !positions.is_empty() {
            let exposed = positions.iter().filter(|p| **p != 0.0).count();
            m.exposure_pct = Some(exposed as f64 / positions.len() as f64 * 100.0);
        }
        m.max_consecutive_wins = Some(longest_streak(&returns, |r| r > 0.0));
        m.max_consecutive_losses = Some(longest_streak(&returns, |r| r < 0.0));
        m.avg_holding_period = average_run_length(&positions);
        m
    }
}

/// Compounded return per calendar month, in date order. Months are taken
/// from `dates`; returns without a date are ignored.
fn monthly_returns(returns: &[f64], dates: &[NaiveDate]) -> Vec<f64> {
    let mut out = Vec::new();
    let mut current: Option<(i32, u32)> = None;
    for (r, d) in returns.iter().zip(dates) {
        let key = (d.year(), d.month());
        if current != Some(key) {
            current = Some(key);
            out.push(0.0);
        }
        if let Some(last) = out.last_mut() {
            *last = (1.0 + *last) * (1.0 + r) - 1.0;
        }
    }
    out
}

fn longest_streak(returns: &[f64], pred: impl Fn(f64) -> bool) -> usize {
    let mut best = 0;
    let mut run = 0;
    for r in returns {
        if pred(*r) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// Mean length of maximal runs of non-zero position.
fn average_run_length(positions: &[f64]) -> Option<f64> {
    let mut runs = Vec::new();
    let mut run = 0usize;
    for p in positions {
        if *p != 0.0 {
            run += 1;
        } else if run > 0 {
            runs.push(run as f64);
            run = 0;
        }
    }
    if run > 0 {
        runs.push(run as f64);
    }
    (!runs.is_empty()).then(|| mean(&runs))
}

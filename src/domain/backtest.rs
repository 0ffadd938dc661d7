//! Single-strategy backtest executor.
//!
//! Decisions made at bar `t-1` act on bar `t`'s return:
//!
//! ```text
//! position[t] = signal[t-1] * size[t-1]
//! cost[t]     = |position[t] - position[t-1]| * (fees + slippage)
//! return[t]   = position[t] * price_return[t] - cost[t]
//! ```

use crate::domain::error::QuantError;
use crate::domain::indicator::window::{rolling_mean, rolling_std, shift};
use crate::domain::ohlcv::PriceTable;
use crate::domain::rule::CompositeRule;
use crate::domain::rule_eval::{IndicatorCache, evaluate_chain};
use crate::domain::signal::{RegimeGate, align_asof, generate_signals, next_session_start};
use crate::domain::strategy::{Frequency, Strategy};
use chrono::NaiveDateTime;

/// Bars in the rolling Sharpe window.
pub const ROLLING_SHARPE_WINDOW: usize = 90;

/// Request-wide cost and reporting parameters. Rates are fractions
/// (`0.001` is 10 bps).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestConfig {
    pub fees: f64,
    pub slippage: f64,
    pub initial_value: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            fees: 0.0,
            slippage: 0.0,
            initial_value: 10_000.0,
        }
    }
}

impl BacktestConfig {
    pub fn cost_rate(&self) -> f64 {
        self.fees + self.slippage
    }
}

/// Regime table and its indicator cache.
pub struct RegimeData<'a> {
    pub table: &'a PriceTable,
    pub cache: &'a IndicatorCache,
}

/// Per-bar outputs of one strategy on its native frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub name: String,
    pub frequency: Frequency,
    pub index: Vec<NaiveDateTime>,
    pub close: Vec<f64>,
    pub signal: Vec<f64>,
    pub size: Vec<f64>,
    pub position: Vec<f64>,
    pub price_return: Vec<f64>,
    pub cost: Vec<f64>,
    pub returns: Vec<f64>,
    pub log_returns: Vec<f64>,
    pub equity: Vec<f64>,
    pub log_equity: Vec<f64>,
    pub drawdown: Vec<f64>,
    pub rolling_sharpe: Vec<f64>,
}

impl StrategyResult {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn total_cost(&self) -> f64 {
        self.cost.iter().sum()
    }
}

/// Evaluates `strategy` on `table`. `cache` must hold the indicators of the
/// strategy's entry/exit chains; missing ones are computed on the fly.
pub fn run_strategy(
    strategy: &Strategy,
    table: &PriceTable,
    cache: &IndicatorCache,
    regime: Option<RegimeData<'_>>,
    config: &BacktestConfig,
) -> Result<StrategyResult, QuantError> {
    let entry = evaluate_chain(&strategy.entry_rules, table, cache)?;
    let exit = evaluate_chain(&strategy.exit_rules, table, cache)?;
    let gate = regime_gate(strategy, table, regime)?;
    let signal = generate_signals(&entry, &exit, &gate, strategy.direction);

    let periods_per_year = strategy.frequency.periods_per_year();
    let size = strategy.sizing.sizes(table.close(), periods_per_year);

    Ok(execute(
        &strategy.name,
        strategy.frequency,
        table,
        signal,
        size,
        config,
    ))
}

fn regime_gate(
    strategy: &Strategy,
    table: &PriceTable,
    regime: Option<RegimeData<'_>>,
) -> Result<RegimeGate, QuantError> {
    let Some(filter) = &strategy.regime else {
        return Ok(RegimeGate::default());
    };
    let data = regime.ok_or_else(|| {
        QuantError::alignment(format!(
            "strategy '{}' needs regime data for '{}'",
            strategy.name, filter.asset
        ))
    })?;

    let observed = if table.is_intraday() && !data.table.is_intraday() {
        next_session_start(data.table.index())
    } else {
        data.table.index().to_vec()
    };
    let align = |chain: &CompositeRule| -> Result<Vec<bool>, QuantError> {
        let raw = evaluate_chain(chain, data.table, data.cache)?;
        align_asof(table.index(), &observed, &raw)
    };
    Ok(RegimeGate {
        entry: filter.entry.as_ref().map(align).transpose()?,
        exit: filter.exit.as_ref().map(align).transpose()?,
    })
}

/// Turns a signal and size series into returns, costs and derived curves.
pub fn execute(
    name: &str,
    frequency: Frequency,
    table: &PriceTable,
    signal: Vec<f64>,
    size: Vec<f64>,
    config: &BacktestConfig,
) -> StrategyResult {
    let close = table.close().to_vec();
    let target: Vec<f64> = signal.iter().zip(&size).map(|(s, z)| s * z).collect();
    let position: Vec<f64> = shift(&target, 1)
        .into_iter()
        .map(|p| if p.is_nan() { 0.0 } else { p })
        .collect();
    let price_return = price_returns(&close);

    let rate = config.cost_rate();
    let mut cost = Vec::with_capacity(close.len());
    let mut returns = Vec::with_capacity(close.len());
    let mut previous = 0.0;
    for (p, r) in position.iter().zip(&price_return) {
        let c = (p - previous).abs() * rate;
        cost.push(c);
        returns.push(p * r - c);
        previous = *p;
    }

    let log_returns: Vec<f64> = returns.iter().map(|r| r.ln_1p()).collect();
    let equity = cumulative_equity(&returns);
    let log_equity = cumulative_sum(&log_returns);
    let drawdown = drawdown(&equity);
    let rolling_sharpe = rolling_sharpe(
        &returns,
        ROLLING_SHARPE_WINDOW,
        frequency.periods_per_year(),
    );

    StrategyResult {
        name: name.to_string(),
        frequency,
        index: table.index().to_vec(),
        close,
        signal,
        size,
        position,
        price_return,
        cost,
        returns,
        log_returns,
        equity,
        log_equity,
        drawdown,
        rolling_sharpe,
    }
}

/// Simple returns with the first bar (and any gap) set to zero.
pub fn price_returns(close: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(close.len());
    for i in 0..close.len() {
        let r = if i == 0 { 0.0 } else { close[i] / close[i - 1] - 1.0 };
        out.push(if r.is_finite() { r } else { 0.0 });
    }
    out
}

pub fn cumulative_equity(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |acc, r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect()
}

pub fn cumulative_sum(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

/// `1 - equity / running_max(equity)`.
pub fn drawdown(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    equity
        .iter()
        .map(|&e| {
            peak = peak.max(e);
            1.0 - e / peak
        })
        .collect()
}

/// `rolling_mean / rolling_std * sqrt(periods_per_year)`; zero where the
/// window's std is zero, NaN during warm-up.
pub fn rolling_sharpe(returns: &[f64], window: usize, periods_per_year: f64) -> Vec<f64> {
    let mean = rolling_mean(returns, window);
    let std = rolling_std(returns, window);
    let annualize = periods_per_year.sqrt();
    mean.iter()
        .zip(&std)
        .map(|(m, s)| {
            if s.is_nan() || m.is_nan() {
                f64::NAN
            } else if *s == 0.0 {
                0.0
            } else {
                m / s * annualize
            }
        })
        .collect()
}

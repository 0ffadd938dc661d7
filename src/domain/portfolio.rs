//! Daily portfolio aggregation.
//!
//! Each strategy result is resampled onto a shared calendar-day grid:
//! returns compound within a day, log returns sum, and state columns
//! (position, signal, equity, drawdown, rolling Sharpe, close) take the
//! day's last observation. Days with no observation carry a zero return and
//! NaN state. The portfolio return is the plain sum of strategy returns.

use crate::domain::backtest::{
    ROLLING_SHARPE_WINDOW, StrategyResult, cumulative_equity, cumulative_sum, drawdown,
    rolling_sharpe,
};
use crate::domain::ohlcv::PriceTable;
use chrono::NaiveDate;

pub const DAYS_PER_YEAR: f64 = 365.0;

/// Every calendar day from `start` to `end` inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyGrid {
    pub dates: Vec<NaiveDate>,
}

impl DailyGrid {
    pub fn spanning(start: NaiveDate, end: NaiveDate) -> Self {
        let dates = start
            .iter_days()
            .take_while(|d| *d <= end)
            .collect();
        Self { dates }
    }

    /// Grid covering every timestamp of every result.
    pub fn covering(results: &[StrategyResult]) -> Self {
        let first = results
            .iter()
            .filter_map(|r| r.index.first())
            .min()
            .map(|t| t.date());
        let last = results
            .iter()
            .filter_map(|r| r.index.last())
            .max()
            .map(|t| t.date());
        match (first, last) {
            (Some(start), Some(end)) => Self::spanning(start, end),
            _ => Self { dates: Vec::new() },
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    fn slot(&self, date: NaiveDate) -> Option<usize> {
        let start = *self.dates.first()?;
        let offset = usize::try_from((date - start).num_days()).ok()?;
        (offset < self.dates.len()).then_some(offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyStrategy {
    pub name: String,
    pub returns: Vec<f64>,
    pub log_returns: Vec<f64>,
    pub position: Vec<f64>,
    pub signal: Vec<f64>,
    pub equity: Vec<f64>,
    pub log_equity: Vec<f64>,
    pub drawdown: Vec<f64>,
    pub rolling_sharpe: Vec<f64>,
    pub close: Vec<f64>,
}

pub fn resample_daily(result: &StrategyResult, grid: &DailyGrid) -> DailyStrategy {
    let n = grid.len();
    let mut daily = DailyStrategy {
        name: result.name.clone(),
        returns: vec![0.0; n],
        log_returns: vec![0.0; n],
        position: vec![f64::NAN; n],
        signal: vec![f64::NAN; n],
        equity: vec![f64::NAN; n],
        log_equity: vec![f64::NAN; n],
        drawdown: vec![f64::NAN; n],
        rolling_sharpe: vec![f64::NAN; n],
        close: vec![f64::NAN; n],
    };

    for (i, ts) in result.index.iter().enumerate() {
        let Some(d) = grid.slot(ts.date()) else {
            continue;
        };
        let r = result.returns[i];
        if !r.is_nan() {
            daily.returns[d] = (1.0 + daily.returns[d]) * (1.0 + r) - 1.0;
        }
        let l = result.log_returns[i];
        if !l.is_nan() {
            daily.log_returns[d] += l;
        }
        daily.position[d] = result.position[i];
        daily.signal[d] = result.signal[i];
        daily.equity[d] = result.equity[i];
        daily.log_equity[d] = result.log_equity[i];
        daily.drawdown[d] = result.drawdown[i];
        daily.rolling_sharpe[d] = result.rolling_sharpe[i];
        daily.close[d] = result.close[i];
    }
    daily
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioResult {
    pub grid: DailyGrid,
    pub strategies: Vec<DailyStrategy>,
    pub returns: Vec<f64>,
    pub log_returns: Vec<f64>,
    pub total_position: Vec<f64>,
    pub equity: Vec<f64>,
    pub log_equity: Vec<f64>,
    pub drawdown: Vec<f64>,
    pub rolling_sharpe: Vec<f64>,
}

pub fn aggregate(results: &[StrategyResult]) -> PortfolioResult {
    let grid = DailyGrid::covering(results);
    let strategies: Vec<DailyStrategy> = results.iter().map(|r| resample_daily(r, &grid)).collect();

    let n = grid.len();
    let mut returns = vec![0.0; n];
    let mut log_returns = vec![0.0; n];
    let mut total_position = vec![0.0; n];
    for s in &strategies {
        for d in 0..n {
            returns[d] += s.returns[d];
            log_returns[d] += s.log_returns[d];
            if !s.position[d].is_nan() {
                total_position[d] += s.position[d];
            }
        }
    }

    let equity = cumulative_equity(&returns);
    let log_equity = cumulative_sum(&log_returns);
    let drawdown = drawdown(&equity);
    let rolling_sharpe = rolling_sharpe(&returns, ROLLING_SHARPE_WINDOW, DAYS_PER_YEAR);

    PortfolioResult {
        grid,
        strategies,
        returns,
        log_returns,
        total_position,
        equity,
        log_equity,
        drawdown,
        rolling_sharpe,
    }
}

/// Always-invested market series on the daily grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    pub close: Vec<f64>,
    pub returns: Vec<f64>,
    pub log_returns: Vec<f64>,
    pub equity: Vec<f64>,
    pub log_equity: Vec<f64>,
    pub drawdown: Vec<f64>,
    pub rolling_sharpe: Vec<f64>,
}

/// Benchmark from `table`'s close, resampled daily by last value and
/// forward-filled across days without bars.
pub fn benchmark(table: &PriceTable, grid: &DailyGrid) -> Benchmark {
    let n = grid.len();
    let mut close = vec![f64::NAN; n];
    for (ts, c) in table.index().iter().zip(table.close()) {
        if let Some(d) = grid.slot(ts.date()) {
            close[d] = *c;
        }
    }
    let mut last = f64::NAN;
    for c in close.iter_mut() {
        if c.is_nan() {
            *c = last;
        } else {
            last = *c;
        }
    }

    let mut returns = vec![0.0; n];
    let mut log_returns = vec![0.0; n];
    for d in 1..n {
        let ratio = close[d] / close[d - 1];
        if ratio.is_finite() {
            returns[d] = ratio - 1.0;
            log_returns[d] = ratio.ln();
        }
    }

    let equity = cumulative_equity(&returns);
    let log_equity = cumulative_sum(&log_returns);
    let drawdown = drawdown(&equity);
    let rolling_sharpe = rolling_sharpe(&returns, ROLLING_SHARPE_WINDOW, DAYS_PER_YEAR);

    Benchmark {
        close,
        returns,
        log_returns,
        equity,
        log_equity,
        drawdown,
        rolling_sharpe,
    }
}

//! Backtest orchestration.
//!
//! One request is one pass: strategies are built and validated up front,
//! indicator caches are computed once per price table, strategies run in
//! parallel against the shared caches, and the results are aggregated into a
//! [`BacktestReport`]. The first error aborts the whole request.

use crate::domain::backtest::{BacktestConfig, RegimeData, StrategyResult, run_strategy};
use crate::domain::error::QuantError;
use crate::domain::metrics::MetricsBundle;
use crate::domain::ohlcv::PriceTable;
use crate::domain::portfolio::{Benchmark, DAYS_PER_YEAR, PortfolioResult, aggregate, benchmark};
use crate::domain::rule_eval::IndicatorCache;
use crate::domain::strategy::{Frequency, Strategy, StrategySpec};
use crate::domain::trades::{Trade, reconstruct_trades};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub strategies: Vec<StrategySpec>,
    pub config: BacktestConfig,
}

/// Price tables for one symbol, keyed by frequency, plus regime assets.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub symbol: String,
    pub tables: HashMap<Frequency, PriceTable>,
    pub regimes: HashMap<String, PriceTable>,
}

impl MarketData {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    pub fn with_table(mut self, frequency: Frequency, table: PriceTable) -> Self {
        self.tables.insert(frequency, table);
        self
    }

    pub fn with_regime(mut self, asset: &str, table: PriceTable) -> Self {
        self.regimes.insert(asset.to_string(), table);
        self
    }

    fn table(&self, frequency: Frequency) -> Result<&PriceTable, QuantError> {
        self.tables.get(&frequency).ok_or_else(|| {
            QuantError::configuration(format!(
                "no {} data for '{}'",
                frequency, self.symbol
            ))
        })
    }

    fn regime(&self, asset: &str) -> Result<&PriceTable, QuantError> {
        self.regimes
            .get(asset)
            .ok_or_else(|| QuantError::alignment(format!("no regime data for '{}'", asset)))
    }
}

/// One row of a date-indexed report table. NaN and infinities are `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    #[serde(rename = "equityCurve")]
    pub equity_curve: Vec<Record>,
    pub drawdown: Vec<Record>,
    #[serde(rename = "rollingSharpe")]
    pub rolling_sharpe: Vec<Record>,
    pub metrics: BTreeMap<String, MetricsBundle>,
    pub signals: BTreeMap<String, Vec<Record>>,
    pub trades: Vec<Trade>,
}

/// Builds every strategy of the request, skipping inactive ones.
pub fn prepare_strategies(specs: &[StrategySpec]) -> Result<Vec<Strategy>, QuantError> {
    let mut names = HashSet::new();
    let mut strategies = Vec::new();
    for spec in specs {
        let strategy = Strategy::from_spec(spec)?;
        if !names.insert(strategy.name.clone()) {
            return Err(QuantError::configuration(format!(
                "duplicate strategy name '{}'",
                strategy.name
            )));
        }
        if strategy.active {
            strategies.push(strategy);
        } else {
            tracing::debug!(strategy = %strategy.name, "skipping inactive strategy");
        }
    }
    if strategies.is_empty() {
        return Err(QuantError::configuration("no active strategies"));
    }
    Ok(strategies)
}

pub fn run_backtest(
    request: &BacktestRequest,
    data: &MarketData,
) -> Result<BacktestReport, QuantError> {
    let strategies = prepare_strategies(&request.strategies)?;

    let mut caches: HashMap<Frequency, IndicatorCache> = HashMap::new();
    for frequency in strategies.iter().map(|s| s.frequency).collect::<HashSet<_>>() {
        let table = data.table(frequency)?;
        let chains = strategies
            .iter()
            .filter(|s| s.frequency == frequency)
            .flat_map(|s| s.primary_rules());
        caches.insert(frequency, IndicatorCache::build(table, chains)?);
    }

    let mut regime_caches: HashMap<&str, IndicatorCache> = HashMap::new();
    for filter in strategies.iter().filter_map(|s| s.regime.as_ref()) {
        if regime_caches.contains_key(filter.asset.as_str()) {
            continue;
        }
        let table = data.regime(&filter.asset)?;
        let chains = strategies
            .iter()
            .filter(|s| s.regime.as_ref().is_some_and(|r| r.asset == filter.asset))
            .flat_map(|s| s.regime_rules());
        regime_caches.insert(filter.asset.as_str(), IndicatorCache::build(table, chains)?);
    }

    let results: Vec<StrategyResult> = strategies
        .par_iter()
        .map(|strategy| -> Result<StrategyResult, QuantError> {
            let table = data.table(strategy.frequency)?;
            let cache = caches
                .get(&strategy.frequency)
                .ok_or_else(|| QuantError::configuration("indicator cache missing"))?;
            let regime = match &strategy.regime {
                Some(filter) => Some(RegimeData {
                    table: data.regime(&filter.asset)?,
                    cache: regime_caches
                        .get(filter.asset.as_str())
                        .ok_or_else(|| QuantError::alignment("regime cache missing"))?,
                }),
                None => None,
            };
            let result = run_strategy(strategy, table, cache, regime, &request.config)?;
            tracing::info!(
                strategy = %strategy.name,
                frequency = %strategy.frequency,
                bars = result.len(),
                total_cost = result.total_cost(),
                "strategy evaluated"
            );
            Ok(result)
        })
        .collect::<Result<_, _>>()?;

    let primary = match data.tables.get(&Frequency::Daily) {
        Some(table) => table,
        None => data.table(strategies[0].frequency)?,
    };
    Ok(build_report(&results, primary, &request.config))
}

fn build_report(results: &[StrategyResult], primary: &PriceTable, config: &BacktestConfig) -> BacktestReport {
    let portfolio = aggregate(results);
    let market = benchmark(primary, &portfolio.grid);

    let mut trades: Vec<Trade> = results
        .iter()
        .flat_map(|r| reconstruct_trades(&r.name, &r.index, &r.position, &r.close))
        .collect();
    trades.sort_by(|a, b| b.entry_date.cmp(&a.entry_date));

    BacktestReport {
        equity_curve: equity_records(&portfolio, &market),
        drawdown: drawdown_records(&portfolio, &market),
        rolling_sharpe: sharpe_records(&portfolio, &market),
        metrics: metrics(&portfolio, &market, config.initial_value),
        signals: signal_records(&portfolio),
        trades,
    }
}

fn value(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn records(dates: &[NaiveDate], columns: Vec<(String, &[f64])>) -> Vec<Record> {
    dates
        .iter()
        .enumerate()
        .map(|(d, date)| Record {
            date: *date,
            values: columns
                .iter()
                .map(|(name, series)| (name.clone(), value(series[d])))
                .collect(),
        })
        .collect()
}

fn equity_records(p: &PortfolioResult, market: &Benchmark) -> Vec<Record> {
    let mut columns: Vec<(String, &[f64])> = vec![
        ("cumulative_log_equity".into(), &p.log_equity[..]),
        ("cumulative_log_market_equity".into(), &market.log_equity[..]),
        ("cumulative_equity".into(), &p.equity[..]),
        ("cumulative_market_equity".into(), &market.equity[..]),
    ];
    for s in &p.strategies {
        columns.push((format!("{}_cumulative_log_equity", s.name), &s.log_equity[..]));
        columns.push((format!("{}_cumulative_equity", s.name), &s.equity[..]));
    }
    records(&p.grid.dates, columns)
}

fn drawdown_records(p: &PortfolioResult, market: &Benchmark) -> Vec<Record> {
    let mut columns: Vec<(String, &[f64])> = vec![
        ("portfolio_drawdown".into(), &p.drawdown[..]),
        ("market_drawdown".into(), &market.drawdown[..]),
    ];
    for s in &p.strategies {
        columns.push((format!("{}_drawdown", s.name), &s.drawdown[..]));
    }
    records(&p.grid.dates, columns)
}

fn sharpe_records(p: &PortfolioResult, market: &Benchmark) -> Vec<Record> {
    let mut columns: Vec<(String, &[f64])> = vec![
        ("portfolio_rolling_sharpe".into(), &p.rolling_sharpe[..]),
        ("market_rolling_sharpe".into(), &market.rolling_sharpe[..]),
    ];
    for s in &p.strategies {
        columns.push((format!("{}_rolling_sharpe", s.name), &s.rolling_sharpe[..]));
    }
    records(&p.grid.dates, columns)
}

fn signal_records(p: &PortfolioResult) -> BTreeMap<String, Vec<Record>> {
    p.strategies
        .iter()
        .map(|s| {
            let columns: Vec<(String, &[f64])> = vec![
                (format!("{}_signal", s.name), &s.signal[..]),
                ("Close".into(), &s.close[..]),
            ];
            (s.name.clone(), records(&p.grid.dates, columns))
        })
        .collect()
}

fn metrics(p: &PortfolioResult, market: &Benchmark, initial_value: f64) -> BTreeMap<String, MetricsBundle> {
    let dates = &p.grid.dates;
    let mut out = BTreeMap::new();
    out.insert(
        "Portfolio".to_string(),
        MetricsBundle::compute(&p.returns, &p.total_position, dates, DAYS_PER_YEAR, initial_value),
    );
    out.insert(
        "Benchmark".to_string(),
        MetricsBundle::compute(&market.returns, &vec![1.0; dates.len()], dates, DAYS_PER_YEAR, initial_value),
    );
    for s in &p.strategies {
        out.insert(
            s.name.clone(),
            MetricsBundle::compute(&s.returns, &s.signal, dates, DAYS_PER_YEAR, initial_value),
        );
    }
    out
}

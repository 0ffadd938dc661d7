//! Technical indicator library and the process-wide indicator registry.
//!
//! Every windowed indicator is shifted one period, so the value at bar `t`
//! only depends on bars before `t`. The registry maps an indicator name to
//! its definition:
//! - whether the first argument is a series (defaulting to `Close`)
//! - the default numeric parameters, which also fix the numeric arity
//! - the compute function
//!
//! The registry is built once on first use and never mutated.

pub mod ema;
pub mod ma_trend;
pub mod move_from_open;
pub mod rolling;
pub mod sma;
pub mod vwap;
pub mod window;

use crate::domain::error::QuantError;
use crate::domain::ohlcv::PriceTable;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Resolved arguments handed to an indicator function.
pub struct IndicatorInput<'a> {
    pub table: &'a PriceTable,
    pub series: &'a [f64],
    pub params: &'a [usize],
}

type ComputeFn = fn(&IndicatorInput<'_>) -> Result<Vec<f64>, QuantError>;

pub struct IndicatorDef {
    pub name: &'static str,
    pub takes_series: bool,
    pub defaults: &'static [f64],
    compute: ComputeFn,
}

impl IndicatorDef {
    /// Number of numeric parameters the indicator expects.
    pub fn arity(&self) -> usize {
        self.defaults.len()
    }

    /// Checks that every numeric parameter is a positive whole number.
    pub fn window_params(&self, params: &[f64]) -> Result<Vec<usize>, String> {
        if params.len() != self.arity() {
            return Err(format!(
                "{} expects {} numeric parameter(s), got {}",
                self.name,
                self.arity(),
                params.len()
            ));
        }
        params
            .iter()
            .map(|&p| {
                if p >= 1.0 && p.fract() == 0.0 && p.is_finite() {
                    Ok(p as usize)
                } else {
                    Err(format!(
                        "{} window parameters must be positive integers, got {}",
                        self.name, p
                    ))
                }
            })
            .collect()
    }

    pub fn compute(
        &self,
        table: &PriceTable,
        series: Option<&[f64]>,
        params: &[f64],
    ) -> Result<Vec<f64>, QuantError> {
        let windows = self
            .window_params(params)
            .map_err(QuantError::configuration)?;
        let series = match (self.takes_series, series) {
            (true, Some(s)) => s,
            (true, None) => {
                return Err(QuantError::configuration(format!(
                    "{} requires a source series",
                    self.name
                )));
            }
            (false, _) => &[],
        };
        if self.takes_series && series.len() != table.len() {
            return Err(QuantError::alignment(format!(
                "{} source series has {} rows, table has {}",
                self.name,
                series.len(),
                table.len()
            )));
        }
        let input = IndicatorInput {
            table,
            series,
            params: &windows,
        };
        (self.compute)(&input)
    }
}

fn sma(input: &IndicatorInput<'_>) -> Result<Vec<f64>, QuantError> {
    Ok(sma::calculate_sma(input.series, input.params[0]))
}

fn ema(input: &IndicatorInput<'_>) -> Result<Vec<f64>, QuantError> {
    Ok(ema::calculate_ema(input.series, input.params[0]))
}

fn rolling_high(input: &IndicatorInput<'_>) -> Result<Vec<f64>, QuantError> {
    Ok(rolling::calculate_rolling_high(input.series, input.params[0]))
}

fn rolling_low(input: &IndicatorInput<'_>) -> Result<Vec<f64>, QuantError> {
    Ok(rolling::calculate_rolling_low(input.series, input.params[0]))
}

fn ma_trend(input: &IndicatorInput<'_>) -> Result<Vec<f64>, QuantError> {
    Ok(ma_trend::calculate_ma_trend(
        input.series,
        input.params[0],
        input.params[1],
    ))
}

fn vwap(input: &IndicatorInput<'_>) -> Result<Vec<f64>, QuantError> {
    vwap::calculate_vwap(input.table)
}

fn average_move_from_open(input: &IndicatorInput<'_>) -> Result<Vec<f64>, QuantError> {
    Ok(move_from_open::calculate_average_move_from_open(
        input.table,
        input.params[0],
    ))
}

static REGISTRY: LazyLock<HashMap<&'static str, IndicatorDef>> = LazyLock::new(|| {
    let defs = [
        IndicatorDef {
            name: "SMA",
            takes_series: true,
            defaults: &[20.0],
            compute: sma,
        },
        IndicatorDef {
            name: "EMA",
            takes_series: true,
            defaults: &[20.0],
            compute: ema,
        },
        IndicatorDef {
            name: "Rolling_High",
            takes_series: true,
            defaults: &[14.0],
            compute: rolling_high,
        },
        IndicatorDef {
            name: "Rolling_Low",
            takes_series: true,
            defaults: &[14.0],
            compute: rolling_low,
        },
        IndicatorDef {
            name: "MA_trend",
            takes_series: true,
            defaults: &[20.0, 5.0],
            compute: ma_trend,
        },
        IndicatorDef {
            name: "VWAP",
            takes_series: false,
            defaults: &[],
            compute: vwap,
        },
        IndicatorDef {
            name: "Average_Move_From_Open",
            takes_series: false,
            defaults: &[14.0],
            compute: average_move_from_open,
        },
    ];
    defs.into_iter().map(|d| (d.name, d)).collect()
});

pub fn lookup(name: &str) -> Option<&'static IndicatorDef> {
    REGISTRY.get(name)
}

/// Registered indicator names, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

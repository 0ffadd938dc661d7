//! Rule evaluation over a whole price table.
//!
//! # Evaluation Semantics
//!
//! - Operands resolve to one value per bar. An indicator is looked up as a
//!   price column, then as a materialized column under its canonical name,
//!   then in the indicator cache, and finally computed from the registry.
//! - Comparisons involving NaN are `false`, including `!=`.
//! - `==` / `!=` compare with an absolute tolerance of `1e-9`.
//! - `divide` yields NaN wherever the quotient is not finite.
//! - Chains fold strictly left to right with no precedence; every rule in the
//!   chain is evaluated.

use crate::domain::error::QuantError;
use crate::domain::indicator::{self, window};
use crate::domain::ohlcv::PriceTable;
use crate::domain::rule::{
    CompositeFunction, CompositeIndicator, CompositeRule, Comparison, Indicator, Logic, Number,
    Operand, Param, Rule,
};
use std::borrow::Cow;
use std::collections::HashMap;

const EPSILON: f64 = 1e-9;

/// Indicator series computed once per price table, keyed by indicator value.
#[derive(Debug, Default, Clone)]
pub struct IndicatorCache {
    series: HashMap<Indicator, Vec<f64>>,
}

impl IndicatorCache {
    /// Computes every registry indicator referenced by `chains`. Names that
    /// are neither columns of `table` nor registered indicators fail here.
    pub fn build<'c>(
        table: &PriceTable,
        chains: impl IntoIterator<Item = &'c CompositeRule>,
    ) -> Result<Self, QuantError> {
        let mut cache = Self::default();
        for chain in chains {
            for ind in chain.extract_indicators() {
                if cache.series.contains_key(&ind) {
                    continue;
                }
                let values = resolve_indicator(&ind, table, &cache)?;
                if let Cow::Owned(values) = values {
                    cache.series.insert(ind, values);
                }
            }
        }
        Ok(cache)
    }

    pub fn get(&self, indicator: &Indicator) -> Option<&[f64]> {
        self.series.get(indicator).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub fn evaluate_chain(
    chain: &CompositeRule,
    table: &PriceTable,
    cache: &IndicatorCache,
) -> Result<Vec<bool>, QuantError> {
    let mut links = chain.links().into_iter();
    let mut acc = match links.next() {
        Some((_, rule)) => evaluate_rule(rule, table, cache)?,
        None => return Ok(vec![false; table.len()]),
    };
    for (logic, rule) in links {
        let next = evaluate_rule(rule, table, cache)?;
        let logic = logic.unwrap_or(Logic::And);
        for (a, b) in acc.iter_mut().zip(next) {
            *a = match logic {
                Logic::And => *a && b,
                Logic::Or => *a || b,
            };
        }
    }
    Ok(acc)
}

pub fn evaluate_rule(
    rule: &Rule,
    table: &PriceTable,
    cache: &IndicatorCache,
) -> Result<Vec<bool>, QuantError> {
    let left = resolve_operand(&rule.left, table, cache)?;
    let right = resolve_operand(&rule.right, table, cache)?;
    Ok(left
        .iter()
        .zip(right.iter())
        .map(|(&l, &r)| compare(l, rule.operator, r))
        .collect())
}

fn compare(l: f64, op: Comparison, r: f64) -> bool {
    if l.is_nan() || r.is_nan() {
        return false;
    }
    match op {
        Comparison::Lt => l < r,
        Comparison::Le => l <= r,
        Comparison::Gt => l > r,
        Comparison::Ge => l >= r,
        Comparison::Eq => (l - r).abs() < EPSILON,
        Comparison::Ne => (l - r).abs() >= EPSILON,
    }
}

pub fn resolve_operand<'a>(
    operand: &Operand,
    table: &'a PriceTable,
    cache: &'a IndicatorCache,
) -> Result<Cow<'a, [f64]>, QuantError> {
    match operand {
        Operand::Constant(Number(c)) => Ok(Cow::Owned(vec![*c; table.len()])),
        Operand::Indicator(ind) => resolve_indicator(ind, table, cache),
        Operand::Composite(c) => evaluate_composite(c, table, cache).map(Cow::Owned),
    }
}

fn resolve_indicator<'a>(
    ind: &Indicator,
    table: &'a PriceTable,
    cache: &'a IndicatorCache,
) -> Result<Cow<'a, [f64]>, QuantError> {
    if ind.is_bare() {
        if let Some(col) = table.column(&ind.name) {
            return Ok(Cow::Borrowed(col));
        }
    } else if let Some(col) = table.column(&ind.to_string()) {
        return Ok(Cow::Borrowed(col));
    }
    if let Some(values) = cache.get(ind) {
        return Ok(Cow::Borrowed(values));
    }

    let def = indicator::lookup(&ind.name).ok_or_else(|| QuantError::UnknownIndicator {
        name: ind.to_string(),
    })?;

    let mut source: Option<Cow<'a, [f64]>> = None;
    let mut numbers = Vec::with_capacity(ind.params.len());
    for param in &ind.params {
        match param {
            Param::Number(Number(n)) => numbers.push(*n),
            Param::Column(name) => {
                let col = table
                    .column(name)
                    .ok_or_else(|| QuantError::UnknownIndicator { name: name.clone() })?;
                source = Some(Cow::Borrowed(col));
            }
            Param::Nested(op) => source = Some(resolve_operand(op, table, cache)?),
        }
    }

    def.compute(table, source.as_deref(), &numbers)
        .map(Cow::Owned)
}

fn evaluate_composite(
    composite: &CompositeIndicator,
    table: &PriceTable,
    cache: &IndicatorCache,
) -> Result<Vec<f64>, QuantError> {
    let n = table.len();

    if composite.function == CompositeFunction::Shift {
        let (Some(target), Some(Operand::Constant(Number(periods)))) =
            (composite.operands.first(), composite.operands.get(1))
        else {
            return Err(QuantError::configuration(format!(
                "shift expects an operand and a constant period: {}",
                composite
            )));
        };
        let values = resolve_operand(target, table, cache)?;
        return Ok(window::shift(&values, *periods as usize));
    }

    let operands = composite
        .operands
        .iter()
        .map(|op| resolve_operand(op, table, cache))
        .collect::<Result<Vec<_>, QuantError>>()?;

    let combine = |f: &dyn Fn(&[f64]) -> f64| -> Vec<f64> {
        let mut row = Vec::with_capacity(operands.len());
        (0..n)
            .map(|i| {
                row.clear();
                row.extend(operands.iter().map(|o| o[i]));
                f(&row)
            })
            .collect()
    };

    let out = match composite.function {
        CompositeFunction::Max => combine(&|row| {
            if row.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            }
        }),
        CompositeFunction::Min => combine(&|row| {
            if row.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                row.iter().copied().fold(f64::INFINITY, f64::min)
            }
        }),
        CompositeFunction::Mean => combine(&|row| row.iter().sum::<f64>() / row.len() as f64),
        CompositeFunction::Add => combine(&|row| row.iter().sum()),
        CompositeFunction::Multiply => combine(&|row| row.iter().product()),
        CompositeFunction::Subtract => combine(&|row| row[0] - row[1]),
        CompositeFunction::Divide => combine(&|row| {
            let q = row[0] / row[1];
            if q.is_finite() { q } else { f64::NAN }
        }),
        CompositeFunction::Shift => unreachable!("handled above"),
    };
    Ok(out)
}

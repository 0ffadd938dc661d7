//! Signal state machine.
//!
//! Folds entry/exit conditions into a direction series in index order,
//! carrying `in_position` from one bar to the next:
//!
//! - FLAT: enter when `entry[t]` holds and the entry regime (if any) allows it.
//! - IN_POSITION: leave when `exit[t]` or the exit regime (if any) holds.
//!
//! The series starts FLAT and is never forced flat at the end.

use crate::domain::error::QuantError;
use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Some(Direction::Long),
            "short" => Some(Direction::Short),
            _ => None,
        }
    }
}

/// Optional regime conditions already aligned onto the primary timeline.
#[derive(Debug, Clone, Default)]
pub struct RegimeGate {
    pub entry: Option<Vec<bool>>,
    pub exit: Option<Vec<bool>>,
}

pub fn generate_signals(
    entry: &[bool],
    exit: &[bool],
    gate: &RegimeGate,
    direction: Direction,
) -> Vec<f64> {
    let sign = direction.sign();
    let mut in_position = false;
    let mut signal = Vec::with_capacity(entry.len());

    for t in 0..entry.len() {
        if in_position {
            let regime_exit = gate.exit.as_ref().is_some_and(|r| r[t]);
            if exit[t] || regime_exit {
                in_position = false;
            }
        } else {
            let regime_allows = gate.entry.as_ref().is_none_or(|r| r[t]);
            if entry[t] && regime_allows {
                in_position = true;
            }
        }
        signal.push(if in_position { sign } else { 0.0 });
    }

    signal
}

/// Reindexes `values` observed at `source` onto `target` by taking the last
/// observation at or before each target timestamp. Targets before the first
/// observation are `false`.
///
/// Timestamps are compared as given. A daily bar stamped 00:00 would match
/// every intraday target of that same day, before the bar has closed, so
/// daily sources feeding an intraday target go through
/// [`next_session_start`] first.
pub fn align_asof(
    target: &[NaiveDateTime],
    source: &[NaiveDateTime],
    values: &[bool],
) -> Result<Vec<bool>, QuantError> {
    if let Some(last) = target.last() {
        if source.first().is_none_or(|first| first > last) {
            return Err(QuantError::alignment(format!(
                "regime data has no observation at or before {}",
                last
            )));
        }
    }

    let mut out = Vec::with_capacity(target.len());
    let mut j = 0usize;
    let mut current: Option<bool> = None;
    for ts in target {
        while j < source.len() && source[j] <= *ts {
            current = Some(values[j]);
            j += 1;
        }
        out.push(current.unwrap_or(false));
    }
    Ok(out)
}

/// Restamps daily observations at 00:00 of the following day, the first
/// moment their close is known.
pub fn next_session_start(daily: &[NaiveDateTime]) -> Vec<NaiveDateTime> {
    daily
        .iter()
        .map(|ts| (ts.date() + Duration::days(1)).and_time(NaiveTime::MIN))
        .collect()
}

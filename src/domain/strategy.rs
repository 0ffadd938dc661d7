//! Strategy configuration and construction.
//!
//! A `StrategySpec` is the textual, serde-friendly form a caller supplies.
//! `Strategy::from_spec` parses every rule and validates the sizing
//! parameters once, so a malformed strategy fails before any evaluation.

use crate::domain::error::QuantError;
use crate::domain::rule::CompositeRule;
use crate::domain::rule_parser::parse_rule;
use crate::domain::signal::Direction;
use crate::domain::sizing::{DEFAULT_VOLATILITY_LOOKBACK, PositionSizing, SizingConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bar interval of a price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "Daily")]
    Daily,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "10m")]
    M10,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "1m")]
    M1,
}

impl Frequency {
    pub const ALL: [Frequency; 8] = [
        Frequency::Daily,
        Frequency::H4,
        Frequency::H1,
        Frequency::M30,
        Frequency::M15,
        Frequency::M10,
        Frequency::M5,
        Frequency::M1,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::H4 => "4h",
            Frequency::H1 => "1h",
            Frequency::M30 => "30m",
            Frequency::M15 => "15m",
            Frequency::M10 => "10m",
            Frequency::M5 => "5m",
            Frequency::M1 => "1m",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("daily") || s.eq_ignore_ascii_case("1d") {
            return Some(Frequency::Daily);
        }
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(s))
    }

    pub fn bars_per_day(self) -> f64 {
        match self {
            Frequency::Daily => 1.0,
            Frequency::H4 => 6.0,
            Frequency::H1 => 24.0,
            Frequency::M30 => 48.0,
            Frequency::M15 => 96.0,
            Frequency::M10 => 144.0,
            Frequency::M5 => 288.0,
            Frequency::M1 => 1440.0,
        }
    }

    /// Calendar-year annualization: markets trade every day.
    pub fn periods_per_year(self) -> f64 {
        365.0 * self.bars_per_day()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "fixed".to_string()
}

fn default_one() -> f64 {
    1.0
}

fn default_frequency() -> String {
    Frequency::Daily.label().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    pub entry_rules: String,
    pub exit_rules: String,
    pub direction: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_method")]
    pub position_size_method: String,
    #[serde(default)]
    pub fixed_position_size: Option<f64>,
    #[serde(default)]
    pub volatility_target: Option<f64>,
    #[serde(default)]
    pub volatility_lookback: Option<usize>,
    #[serde(default)]
    pub volatility_buffer: Option<f64>,
    #[serde(default = "default_one")]
    pub allocation: f64,
    #[serde(default = "default_one")]
    pub max_leverage: f64,
    #[serde(default = "default_frequency")]
    pub frequency: String,
    #[serde(default)]
    pub regime_asset: Option<String>,
    #[serde(default)]
    pub entry_regime: Option<String>,
    #[serde(default)]
    pub exit_regime: Option<String>,
}

impl StrategySpec {
    /// A long, fixed-size, daily spec with full allocation.
    pub fn new(name: &str, entry_rules: &str, exit_rules: &str) -> Self {
        Self {
            name: name.to_string(),
            entry_rules: entry_rules.to_string(),
            exit_rules: exit_rules.to_string(),
            direction: "long".to_string(),
            active: true,
            position_size_method: default_method(),
            fixed_position_size: Some(1.0),
            volatility_target: None,
            volatility_lookback: None,
            volatility_buffer: None,
            allocation: 1.0,
            max_leverage: 1.0,
            frequency: default_frequency(),
            regime_asset: None,
            entry_regime: None,
            exit_regime: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeFilter {
    pub asset: String,
    pub entry: Option<CompositeRule>,
    pub exit: Option<CompositeRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub entry_rules: CompositeRule,
    pub exit_rules: CompositeRule,
    pub direction: Direction,
    pub active: bool,
    pub sizing: SizingConfig,
    pub frequency: Frequency,
    pub regime: Option<RegimeFilter>,
}

impl Strategy {
    pub fn from_spec(spec: &StrategySpec) -> Result<Self, QuantError> {
        let name = spec.name.trim();
        if name.is_empty() {
            return Err(QuantError::configuration("strategy name must not be empty"));
        }
        let invalid = |reason: String| QuantError::configuration(format!("strategy '{}': {}", name, reason));

        let direction = Direction::parse(&spec.direction)
            .ok_or_else(|| invalid(format!("unknown direction '{}'", spec.direction)))?;
        let frequency = Frequency::parse(&spec.frequency)
            .ok_or_else(|| invalid(format!("unsupported frequency '{}'", spec.frequency)))?;

        let method = match spec.position_size_method.trim() {
            "fixed" => {
                let fraction = spec
                    .fixed_position_size
                    .ok_or_else(|| invalid("fixed sizing requires fixed_position_size".into()))?;
                if !(fraction >= 0.0) {
                    return Err(invalid("fixed_position_size must be non-negative".into()));
                }
                PositionSizing::Fixed { fraction }
            }
            "volatility_target" => {
                let target = spec
                    .volatility_target
                    .ok_or_else(|| invalid("volatility targeting requires volatility_target".into()))?;
                if !(target > 0.0) {
                    return Err(invalid("volatility_target must be positive".into()));
                }
                let lookback = spec
                    .volatility_lookback
                    .unwrap_or(DEFAULT_VOLATILITY_LOOKBACK);
                if lookback == 0 {
                    return Err(invalid("volatility_lookback must be at least 1".into()));
                }
                if spec.volatility_buffer.is_some_and(|b| !(b >= 0.0)) {
                    return Err(invalid("volatility_buffer must be non-negative".into()));
                }
                PositionSizing::VolatilityTarget {
                    target,
                    lookback,
                    buffer: spec.volatility_buffer,
                }
            }
            other => return Err(invalid(format!("unknown position_size_method '{}'", other))),
        };

        if !(spec.allocation >= 0.0) {
            return Err(invalid("allocation must be non-negative".into()));
        }
        if !(spec.max_leverage > 0.0) {
            return Err(invalid("max_leverage must be positive".into()));
        }

        let entry_rules = parse_rule(&spec.entry_rules)?;
        let exit_rules = parse_rule(&spec.exit_rules)?;

        let entry_regime = optional_rule(spec.entry_regime.as_deref())?;
        let exit_regime = optional_rule(spec.exit_regime.as_deref())?;
        let asset = spec
            .regime_asset
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());
        let regime = match (asset, entry_regime, exit_regime) {
            (_, None, None) => None,
            (Some(asset), entry, exit) => Some(RegimeFilter {
                asset: asset.to_string(),
                entry,
                exit,
            }),
            (None, _, _) => {
                return Err(invalid("regime rules require regime_asset".into()));
            }
        };

        Ok(Self {
            name: name.to_string(),
            entry_rules,
            exit_rules,
            direction,
            active: spec.active,
            sizing: SizingConfig {
                method,
                allocation: spec.allocation,
                max_leverage: spec.max_leverage,
            },
            frequency,
            regime,
        })
    }

    /// Entry and exit chains, evaluated on the strategy's own price table.
    pub fn primary_rules(&self) -> [&CompositeRule; 2] {
        [&self.entry_rules, &self.exit_rules]
    }

    /// Regime chains, evaluated on the regime asset's table.
    pub fn regime_rules(&self) -> Vec<&CompositeRule> {
        self.regime
            .iter()
            .flat_map(|r| r.entry.iter().chain(r.exit.iter()))
            .collect()
    }
}

fn optional_rule(text: Option<&str>) -> Result<Option<CompositeRule>, QuantError> {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(Some(parse_rule(t)?)),
        _ => Ok(None),
    }
}

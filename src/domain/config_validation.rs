//! Configuration validation.
//!
//! Validates the `[backtest]` section and every `[strategy.<id>]` section
//! before any data is loaded. Rule text is only checked for presence here;
//! parsing happens when strategies are built.

use crate::domain::error::QuantError;
use crate::domain::signal::Direction;
use crate::domain::strategy::Frequency;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const BACKTEST_SECTION: &str = "backtest";
pub const STRATEGY_PREFIX: &str = "strategy.";

/// `[strategy.<id>]` section names, sorted.
pub fn strategy_sections(config: &dyn ConfigPort) -> Vec<String> {
    config
        .sections()
        .into_iter()
        .filter(|s| s.starts_with(STRATEGY_PREFIX) && s.len() > STRATEGY_PREFIX.len())
        .collect()
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), QuantError> {
    validate_symbol(config)?;
    validate_rate(config, "fees")?;
    validate_rate(config, "slippage")?;
    validate_initial_value(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let sections = strategy_sections(config);
    if sections.is_empty() {
        return Err(QuantError::ConfigMissing {
            section: format!("{}<id>", STRATEGY_PREFIX),
            key: "entry".to_string(),
        });
    }
    for section in &sections {
        validate_strategy_section(config, section)?;
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> QuantError {
    QuantError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> QuantError {
    QuantError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), QuantError> {
    match config.get_string(BACKTEST_SECTION, "symbol") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(missing(BACKTEST_SECTION, "symbol")),
    }
}

fn validate_rate(config: &dyn ConfigPort, key: &str) -> Result<(), QuantError> {
    let value = config.get_double(BACKTEST_SECTION, key, 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            BACKTEST_SECTION,
            key,
            format!("{} must be a fraction in [0, 1)", key),
        ));
    }
    Ok(())
}

fn validate_initial_value(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let value = config.get_double(BACKTEST_SECTION, "initial_value", 10_000.0);
    if value <= 0.0 {
        return Err(invalid(
            BACKTEST_SECTION,
            "initial_value",
            "initial_value must be positive",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let start_str = config.get_string(BACKTEST_SECTION, "start_date");
    let end_str = config.get_string(BACKTEST_SECTION, "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            BACKTEST_SECTION,
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, QuantError> {
    match value {
        None => Err(missing(BACKTEST_SECTION, field)),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                BACKTEST_SECTION,
                field,
                format!("invalid {} format, expected YYYY-MM-DD", field),
            )
        }),
    }
}

fn require_text(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), QuantError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(missing(section, key)),
    }
}

fn positive_if_present(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), QuantError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(());
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v > 0.0 => Ok(()),
        Ok(_) => Err(invalid(section, key, format!("{} must be positive", key))),
        Err(_) => Err(invalid(section, key, format!("{} must be a number", key))),
    }
}

fn validate_strategy_section(config: &dyn ConfigPort, section: &str) -> Result<(), QuantError> {
    require_text(config, section, "entry")?;
    require_text(config, section, "exit")?;

    if let Some(direction) = config.get_string(section, "direction") {
        if Direction::parse(&direction).is_none() {
            return Err(invalid(section, "direction", "direction must be long or short"));
        }
    }

    if let Some(frequency) = config.get_string(section, "frequency") {
        if Frequency::parse(&frequency).is_none() {
            return Err(invalid(
                section,
                "frequency",
                format!("unsupported frequency '{}'", frequency.trim()),
            ));
        }
    }

    let method = config
        .get_string(section, "position_size_method")
        .unwrap_or_else(|| "fixed".to_string());
    match method.trim() {
        "fixed" => {
            if config.get_string(section, "fixed_position_size").is_none() {
                return Err(missing(section, "fixed_position_size"));
            }
            positive_if_present(config, section, "fixed_position_size")?;
        }
        "volatility_target" => {
            if config.get_string(section, "volatility_target").is_none() {
                return Err(missing(section, "volatility_target"));
            }
            positive_if_present(config, section, "volatility_target")?;
            if config.get_int(section, "volatility_lookback", 30) < 1 {
                return Err(invalid(
                    section,
                    "volatility_lookback",
                    "volatility_lookback must be at least 1",
                ));
            }
        }
        other => {
            return Err(invalid(
                section,
                "position_size_method",
                format!("unknown position_size_method '{}'", other),
            ));
        }
    }

    positive_if_present(config, section, "max_leverage")?;
    if config.get_double(section, "allocation", 1.0) < 0.0 {
        return Err(invalid(section, "allocation", "allocation must be non-negative"));
    }

    let has_regime_rule = ["entry_regime", "exit_regime"]
        .iter()
        .any(|k| config.get_string(section, k).is_some_and(|s| !s.trim().is_empty()));
    if has_regime_rule {
        require_text(config, section, "regime_asset")?;
    }
    Ok(())
}

//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod signal;
pub mod sizing;
pub mod strategy;
pub mod backtest;
pub mod portfolio;
pub mod metrics;
pub mod trades;
pub mod engine;
pub mod config_validation;
pub mod error;

//! CLI integration tests for the backtest command orchestration.
//!
//! Tests cover:
//! - Config loading and validation from INI files on disk
//! - Settings and strategy construction (build_backtest_settings, build_strategy_specs)
//! - Market data loading with MockDataPort, including regime assets
//! - Full pipeline against CSV files in a temp directory
//! - Command dispatch through `cli::run`

mod common;

use approx::assert_relative_eq;
use clap::Parser;
use common::*;
use quantlab::adapters::csv_adapter::CsvAdapter;
use quantlab::adapters::file_config_adapter::FileConfigAdapter;
use quantlab::adapters::json_report_adapter::JsonReportAdapter;
use quantlab::cli::{self, Cli};
use quantlab::domain::config_validation::{validate_backtest_config, validate_strategy_config};
use quantlab::domain::engine::prepare_strategies;
use quantlab::domain::error::QuantError;
use quantlab::domain::strategy::Frequency;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn is_success(code: ExitCode) -> bool {
    format!("{:?}", code) == format!("{:?}", ExitCode::SUCCESS)
}

const VALID_INI: &str = r#"
[backtest]
symbol = TEST
data_dir = data
start_date = 2024-01-01
end_date = 2024-03-31
fees = 0.001
slippage = 0.0005

[strategy.trend]
name = Trend
entry = Close > SMA(10)
exit = Close < SMA(10)
fixed_position_size = 1.0

[strategy.fast]
entry = Close > EMA(5) and Close > SMA(3)
exit = Close < EMA(5)
direction = long
fixed_position_size = 0.5
frequency = 4h
"#;

/// Writes `{symbol}_{label}.csv` with the given closes, one bar per `step`.
fn write_csv(dir: &Path, symbol: &str, frequency: Frequency, step: chrono::Duration, closes: &[f64]) {
    let path = dir.join(format!("{}_{}.csv", symbol, frequency.label()));
    let mut out = String::from("date,open,high,low,close,volume\n");
    for bar in bars_from_closes(midnight(date(2024, 1, 1)), step, closes) {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    std::fs::write(path, out).unwrap();
}

mod config_loading {
    use super::*;

    #[test]
    fn valid_config_passes_validation() {
        let file = write_temp_ini(VALID_INI);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        validate_backtest_config(&adapter).unwrap();
        validate_strategy_config(&adapter).unwrap();
    }

    #[test]
    fn settings_resolve_data_dir_against_config_dir() {
        let file = write_temp_ini(VALID_INI);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        let base = file.path().parent().unwrap();
        let settings = cli::build_backtest_settings(&adapter, base).unwrap();

        assert_eq!(settings.symbol, "TEST");
        assert_eq!(settings.data_dir, base.join("data"));
        assert_eq!(settings.start_date, date(2024, 1, 1));
        assert_eq!(settings.end_date, date(2024, 3, 31));
        assert_relative_eq!(settings.config.cost_rate(), 0.0015, epsilon = 1e-12);
    }

    #[test]
    fn absolute_data_dir_is_kept() {
        let ini = VALID_INI.replace("data_dir = data", "data_dir = /srv/prices");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let settings = cli::build_backtest_settings(&adapter, Path::new("/tmp")).unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/srv/prices"));
    }

    #[test]
    fn missing_symbol_is_reported() {
        let ini = VALID_INI.replace("symbol = TEST", "");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        assert!(matches!(
            validate_backtest_config(&adapter).unwrap_err(),
            QuantError::ConfigMissing { .. }
        ));
    }

    #[test]
    fn inverted_date_range_is_invalid() {
        let ini = VALID_INI.replace("end_date = 2024-03-31", "end_date = 2023-12-31");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        assert!(matches!(
            validate_backtest_config(&adapter).unwrap_err(),
            QuantError::ConfigInvalid { .. }
        ));
    }

    #[test]
    fn unknown_sizing_method_is_invalid() {
        let ini = VALID_INI.replace(
            "fixed_position_size = 0.5",
            "position_size_method = kelly",
        );
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        assert!(matches!(
            validate_strategy_config(&adapter).unwrap_err(),
            QuantError::ConfigInvalid { .. }
        ));
    }
}

mod strategy_building {
    use super::*;

    #[test]
    fn sections_become_specs() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let specs = cli::build_strategy_specs(&adapter).unwrap();
        assert_eq!(specs.len(), 2);

        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Trend"));
        assert!(names.contains(&"fast"));

        let fast = specs.iter().find(|s| s.name == "fast").unwrap();
        assert_eq!(fast.frequency, "4h");
        assert_eq!(fast.fixed_position_size, Some(0.5));
    }

    #[test]
    fn bad_rule_text_fails_at_preparation() {
        let ini = VALID_INI.replace("exit = Close < EMA(5)", "exit = Close <");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let specs = cli::build_strategy_specs(&adapter).unwrap();
        assert!(matches!(
            prepare_strategies(&specs).unwrap_err(),
            QuantError::RuleParse(_)
        ));
    }
}

mod market_data {
    use super::*;

    fn settings() -> cli::BacktestSettings {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        cli::build_backtest_settings(&adapter, Path::new(".")).unwrap()
    }

    #[test]
    fn loads_each_frequency_and_daily_benchmark() {
        let port = MockDataPort::new()
            .with_bars(
                "TEST",
                Frequency::H4,
                bars_from_closes(midnight(date(2024, 1, 1)), chrono::Duration::hours(4), &wavy_closes(120, 100.0)),
            )
            .with_bars(
                "TEST",
                Frequency::Daily,
                bars_from_closes(midnight(date(2024, 1, 1)), chrono::Duration::days(1), &wavy_closes(20, 100.0)),
            );
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let strategies = prepare_strategies(&cli::build_strategy_specs(&adapter).unwrap()).unwrap();
        let data = cli::load_market_data(&port, &settings(), &strategies).unwrap();

        assert_eq!(data.tables.len(), 2);
        assert_eq!(data.tables[&Frequency::H4].len(), 120);
        assert!(data.regimes.is_empty());
    }

    #[test]
    fn missing_regime_asset_is_alignment_error() {
        let ini = format!(
            "{}regime_asset = SPY\nentry_regime = Close > SMA(5)\n",
            VALID_INI
        );
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let strategies = prepare_strategies(&cli::build_strategy_specs(&adapter).unwrap()).unwrap();
        let port = MockDataPort::new()
            .with_bars(
                "TEST",
                Frequency::Daily,
                bars_from_closes(midnight(date(2024, 1, 1)), chrono::Duration::days(1), &wavy_closes(20, 100.0)),
            )
            .with_bars(
                "TEST",
                Frequency::H4,
                bars_from_closes(midnight(date(2024, 1, 1)), chrono::Duration::hours(4), &wavy_closes(60, 100.0)),
            );
        assert!(matches!(
            cli::load_market_data(&port, &settings(), &strategies).unwrap_err(),
            QuantError::DataAlignment { .. }
        ));
    }

    #[test]
    fn unavailable_frequency_is_configuration_error() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let strategies = prepare_strategies(&cli::build_strategy_specs(&adapter).unwrap()).unwrap();
        let port = MockDataPort::new().with_bars(
            "TEST",
            Frequency::Daily,
            bars_from_closes(midnight(date(2024, 1, 1)), chrono::Duration::days(1), &wavy_closes(20, 100.0)),
        );
        let err = cli::load_market_data(&port, &settings(), &strategies).unwrap_err();
        match err {
            QuantError::Configuration { reason } => assert!(reason.contains("4h"), "{}", reason),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn data_source_error_propagates() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let strategies = prepare_strategies(&cli::build_strategy_specs(&adapter).unwrap()).unwrap();
        let port = MockDataPort::new().with_error("TEST", "connection refused");
        assert!(matches!(
            cli::load_market_data(&port, &settings(), &strategies).unwrap_err(),
            QuantError::Data { .. }
        ));
    }
}

mod full_pipeline {
    use super::*;

    fn workspace() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        write_csv(&data, "TEST", Frequency::Daily, chrono::Duration::days(1), &wavy_closes(91, 100.0));
        write_csv(&data, "TEST", Frequency::H4, chrono::Duration::hours(4), &wavy_closes(91 * 6, 100.0));
        let config = dir.path().join("backtest.ini");
        std::fs::write(&config, VALID_INI).unwrap();
        (dir, config)
    }

    #[test]
    fn csv_pipeline_writes_json_report() {
        let (dir, config) = workspace();
        let adapter = FileConfigAdapter::from_file(&config).unwrap();
        let settings = cli::build_backtest_settings(&adapter, dir.path()).unwrap();
        let specs = cli::build_strategy_specs(&adapter).unwrap();
        let output = dir.path().join("out").join("report.json");

        let report = cli::run_backtest_pipeline(
            &CsvAdapter::new(settings.data_dir.clone()),
            &JsonReportAdapter::new(),
            &settings,
            specs,
            Some(&output),
        )
        .unwrap();

        assert_eq!(report.equity_curve.len(), 91);
        assert!(report.metrics.contains_key("Trend"));
        assert!(report.metrics.contains_key("fast"));

        let written = std::fs::read_to_string(&output).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["equityCurve"].as_array().unwrap().len(), 91);
        assert!(value["metrics"]["Portfolio"]["Total Return"].is_number());
        assert!(value["signals"]["Trend"].is_array());
        assert!(!written.contains("NaN"));
    }

    #[test]
    fn mock_pipeline_without_output_writes_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let ini = VALID_INI.replace("frequency = 4h", "frequency = Daily");
        let adapter = FileConfigAdapter::from_string(&ini).unwrap();
        let settings = cli::build_backtest_settings(&adapter, dir.path()).unwrap();
        let specs = cli::build_strategy_specs(&adapter).unwrap();
        let port = MockDataPort::new().with_bars(
            "TEST",
            Frequency::Daily,
            bars_from_closes(midnight(date(2024, 1, 1)), chrono::Duration::days(1), &wavy_closes(60, 100.0)),
        );

        let report =
            cli::run_backtest_pipeline(&port, &JsonReportAdapter::new(), &settings, specs, None).unwrap();
        assert_eq!(report.equity_curve.len(), 60);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn backtest_command_fails_without_intraday_file() {
        let (dir, config) = workspace();
        std::fs::remove_file(dir.path().join("data").join("TEST_4h.csv")).unwrap();
        let code = cli::run(Cli::parse_from([
            "quantlab",
            "backtest",
            "-c",
            config.to_str().unwrap(),
            "-o",
            dir.path().join("report.json").to_str().unwrap(),
        ]));
        assert!(!is_success(code));
        assert!(!dir.path().join("report.json").exists());
    }

    #[test]
    fn validate_command_succeeds_on_disk() {
        let (_dir, config) = workspace();
        let code = cli::run(Cli::parse_from([
            "quantlab",
            "validate",
            "-c",
            config.to_str().unwrap(),
        ]));
        assert!(is_success(code));
    }

    #[test]
    fn dry_run_loads_no_data() {
        let (dir, config) = workspace();
        std::fs::remove_dir_all(dir.path().join("data")).unwrap();
        let code = cli::run(Cli::parse_from([
            "quantlab",
            "backtest",
            "-c",
            config.to_str().unwrap(),
            "--dry-run",
        ]));
        assert!(is_success(code));
    }

    #[test]
    fn backtest_command_writes_output_file() {
        let (dir, config) = workspace();
        let output = dir.path().join("report.json");
        let code = cli::run(Cli::parse_from([
            "quantlab",
            "backtest",
            "-c",
            config.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ]));
        assert!(is_success(code));
        assert!(output.exists());
    }

    #[test]
    fn missing_config_file_fails() {
        let code = cli::run(Cli::parse_from([
            "quantlab",
            "validate",
            "-c",
            "/nonexistent/backtest.ini",
        ]));
        assert!(!is_success(code));
    }
}

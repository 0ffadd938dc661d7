//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::BacktestConfig;
use crate::domain::config_validation::{
    BACKTEST_SECTION, STRATEGY_PREFIX, parse_date, strategy_sections, validate_backtest_config,
    validate_strategy_config,
};
use crate::domain::engine::{BacktestReport, BacktestRequest, MarketData, prepare_strategies, run_backtest};
use crate::domain::error::QuantError;
use crate::domain::indicator;
use crate::domain::metrics::DEFAULT_INITIAL_VALUE;
use crate::domain::rule_parser::parse_rule;
use crate::domain::strategy::{Frequency, Strategy, StrategySpec};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "quantlab", about = "Rule-driven strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration and show the parsed rules
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the built-in indicators and their default parameters
    Indicators,
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest_command(&config, output.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Indicators => run_indicators(),
    }
}

/// Installs a stderr subscriber filtered by `RUST_LOG` (default `warn`).
/// A second call is a no-op.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = QuantError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: QuantError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

/// Values of the `[backtest]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub symbol: String,
    pub data_dir: PathBuf,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub config: BacktestConfig,
}

/// Reads `[backtest]`. A relative `data_dir` is resolved against `base_dir`.
pub fn build_backtest_settings(
    adapter: &dyn ConfigPort,
    base_dir: &Path,
) -> Result<BacktestSettings, QuantError> {
    let symbol = adapter
        .get_string(BACKTEST_SECTION, "symbol")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| QuantError::ConfigMissing {
            section: BACKTEST_SECTION.into(),
            key: "symbol".into(),
        })?;
    let start_date = parse_date(
        adapter.get_string(BACKTEST_SECTION, "start_date").as_deref(),
        "start_date",
    )?;
    let end_date = parse_date(
        adapter.get_string(BACKTEST_SECTION, "end_date").as_deref(),
        "end_date",
    )?;
    let data_dir = PathBuf::from(
        adapter
            .get_string(BACKTEST_SECTION, "data_dir")
            .unwrap_or_else(|| "data".to_string())
            .trim(),
    );
    let data_dir = if data_dir.is_relative() {
        base_dir.join(data_dir)
    } else {
        data_dir
    };

    Ok(BacktestSettings {
        symbol,
        data_dir,
        start_date,
        end_date,
        config: BacktestConfig {
            fees: adapter.get_double(BACKTEST_SECTION, "fees", 0.0),
            slippage: adapter.get_double(BACKTEST_SECTION, "slippage", 0.0),
            initial_value: adapter.get_double(
                BACKTEST_SECTION,
                "initial_value",
                DEFAULT_INITIAL_VALUE,
            ),
        },
    })
}

fn optional<T: FromStr>(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, QuantError> {
    match adapter.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| QuantError::ConfigInvalid {
                section: section.into(),
                key: key.into(),
                reason: format!("'{}' is not a valid number", raw.trim()),
            }),
    }
}

/// One [`StrategySpec`] per `[strategy.<id>]` section. The name defaults to
/// the section id.
pub fn build_strategy_specs(adapter: &dyn ConfigPort) -> Result<Vec<StrategySpec>, QuantError> {
    let mut specs = Vec::new();
    for section in strategy_sections(adapter) {
        let id = &section[STRATEGY_PREFIX.len()..];
        let text = |key: &str| adapter.get_string(&section, key).unwrap_or_default();
        let maybe_text = |key: &str| {
            adapter
                .get_string(&section, key)
                .filter(|s| !s.trim().is_empty())
        };

        specs.push(StrategySpec {
            name: maybe_text("name").unwrap_or_else(|| id.to_string()),
            entry_rules: text("entry"),
            exit_rules: text("exit"),
            direction: maybe_text("direction").unwrap_or_else(|| "long".into()),
            active: adapter.get_bool(&section, "active", true),
            position_size_method: maybe_text("position_size_method").unwrap_or_else(|| "fixed".into()),
            fixed_position_size: optional(adapter, &section, "fixed_position_size")?,
            volatility_target: optional(adapter, &section, "volatility_target")?,
            volatility_lookback: optional(adapter, &section, "volatility_lookback")?,
            volatility_buffer: optional(adapter, &section, "volatility_buffer")?,
            allocation: adapter.get_double(&section, "allocation", 1.0),
            max_leverage: adapter.get_double(&section, "max_leverage", 1.0),
            frequency: maybe_text("frequency").unwrap_or_else(|| Frequency::Daily.label().into()),
            regime_asset: maybe_text("regime_asset"),
            entry_regime: maybe_text("entry_regime"),
            exit_regime: maybe_text("exit_regime"),
        });
    }
    Ok(specs)
}

/// Fetches every table the strategies need. Regime assets are read at daily
/// frequency. The daily table of the symbol is loaded for the benchmark when
/// available.
pub fn load_market_data(
    data_port: &dyn DataPort,
    settings: &BacktestSettings,
    strategies: &[Strategy],
) -> Result<MarketData, QuantError> {
    let mut data = MarketData::new(&settings.symbol);
    let (start, end) = (settings.start_date, settings.end_date);

    let mut frequencies: Vec<Frequency> = strategies.iter().map(|s| s.frequency).collect();
    frequencies.sort();
    frequencies.dedup();
    let available = data_port.available_frequencies(&settings.symbol)?;
    if let Some(missing) = frequencies.iter().find(|f| !available.contains(f)) {
        return Err(QuantError::configuration(format!(
            "frequency {} unsupported by data source for '{}'",
            missing, settings.symbol
        )));
    }
    for frequency in frequencies {
        let table = data_port.fetch_table(&settings.symbol, frequency, start, end)?;
        eprintln!(
            "Loaded {} {} bars for {}",
            table.len(),
            frequency,
            settings.symbol
        );
        data = data.with_table(frequency, table);
    }

    if !data.tables.contains_key(&Frequency::Daily) {
        match data_port.fetch_table(&settings.symbol, Frequency::Daily, start, end) {
            Ok(table) => data = data.with_table(Frequency::Daily, table),
            Err(e) => tracing::warn!(error = %e, "no daily data; benchmark uses strategy frequency"),
        }
    }

    for filter in strategies.iter().filter_map(|s| s.regime.as_ref()) {
        if data.regimes.contains_key(&filter.asset) {
            continue;
        }
        let table = data_port
            .fetch_table(&filter.asset, Frequency::Daily, start, end)
            .map_err(|e| QuantError::alignment(format!("regime asset '{}': {}", filter.asset, e)))?;
        data = data.with_regime(&filter.asset, table);
    }
    Ok(data)
}

/// Loads data, runs the backtest and writes the report when `output` is set.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    settings: &BacktestSettings,
    specs: Vec<StrategySpec>,
    output: Option<&Path>,
) -> Result<BacktestReport, QuantError> {
    let strategies = prepare_strategies(&specs)?;
    let data = load_market_data(data_port, settings, &strategies)?;
    let request = BacktestRequest {
        strategies: specs,
        config: settings.config,
    };
    let report = run_backtest(&request, &data)?;
    if let Some(path) = output {
        report_port.write(&report, &path.to_string_lossy())?;
        eprintln!("Report written to {}", path.display());
    }
    Ok(report)
}

fn config_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn load_and_validate(config_path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_backtest_config(&adapter).map_err(fail)?;
    validate_strategy_config(&adapter).map_err(fail)?;
    Ok(adapter)
}

/// Parses every rule of every strategy section, printing the parsed form or
/// the error with a caret under the offending fragment.
fn report_rules(adapter: &dyn ConfigPort) -> Result<(), QuantError> {
    for section in strategy_sections(adapter) {
        eprintln!("\n[{}]", section);
        for key in ["entry", "exit", "entry_regime", "exit_regime"] {
            let Some(raw) = adapter
                .get_string(&section, key)
                .filter(|s| !s.trim().is_empty())
            else {
                continue;
            };
            match parse_rule(&raw) {
                Ok(rule) => eprintln!("  {:<13} {}", format!("{}:", key), rule),
                Err(e) => {
                    eprintln!("  {} error:\n{}", key, e.display_with_context(&raw));
                    return Err(e.into());
                }
            }
        }
    }
    Ok(())
}

fn run_backtest_command(config_path: &Path, output: Option<&Path>) -> ExitCode {
    let adapter = match load_and_validate(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = report_rules(&adapter) {
        return (&e).into();
    }

    let settings = match build_backtest_settings(&adapter, &config_dir(config_path)) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let specs = match build_strategy_specs(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let data_port = CsvAdapter::new(settings.data_dir.clone());
    let report_port = JsonReportAdapter::new();
    let report = match run_backtest_pipeline(&data_port, &report_port, &settings, specs, output) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if output.is_none() {
        match report_port.render(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => return fail(e),
        }
    }
    print_summary(&report);
    ExitCode::SUCCESS
}

fn fmt_pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}%", x * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

fn fmt_num(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_summary(report: &BacktestReport) {
    eprintln!("\n{:<16} {:>12} {:>10} {:>12} {:>8}", "", "Total", "Sharpe", "Max DD", "Trades");
    for (name, m) in &report.metrics {
        eprintln!(
            "{:<16} {:>12} {:>10} {:>12} {:>8}",
            name,
            fmt_pct(m.total_return),
            fmt_num(m.sharpe_ratio),
            fmt_pct(m.max_drawdown),
            m.num_trades.map(|n| n.to_string()).unwrap_or_default()
        );
    }
    let open = report.trades.iter().filter(|t| t.is_open).count();
    eprintln!("\n{} round-trip trades ({} open)", report.trades.len(), open);
}

fn run_dry_run(config_path: &Path) -> ExitCode {
    let adapter = match load_and_validate(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");
    if let Err(e) = report_rules(&adapter) {
        return (&e).into();
    }

    let settings = match build_backtest_settings(&adapter, &config_dir(config_path)) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let strategies = match build_strategy_specs(&adapter).and_then(|s| prepare_strategies(&s)) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let mut indicators: Vec<String> = strategies
        .iter()
        .flat_map(|s| s.primary_rules().into_iter().chain(s.regime_rules()))
        .flat_map(|chain| chain.extract_indicators())
        .map(|i| i.to_string())
        .collect();
    indicators.sort();
    indicators.dedup();

    eprintln!("\nIndicators to compute:");
    for ind in &indicators {
        eprintln!("  {}", ind);
    }

    eprintln!("\nData:");
    eprintln!("  symbol:   {}", settings.symbol);
    eprintln!("  data_dir: {}", settings.data_dir.display());
    eprintln!("  range:    {} to {}", settings.start_date, settings.end_date);

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_and_validate(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = report_rules(&adapter) {
        return (&e).into();
    }
    match build_strategy_specs(&adapter).and_then(|s| prepare_strategies(&s)) {
        Ok(strategies) => {
            eprintln!("\n{} active strategies; configuration is valid.", strategies.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_indicators() -> ExitCode {
    for name in indicator::names() {
        if let Some(def) = indicator::lookup(name) {
            let defaults: Vec<String> = def.defaults.iter().map(|d| d.to_string()).collect();
            let input = if def.takes_series { "series" } else { "table" };
            println!("{:<24} {:<7} ({})", name, input, defaults.join(", "));
        }
    }
    ExitCode::SUCCESS
}

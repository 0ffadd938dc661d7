//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        let mut sections = self.config.sections();
        sections.sort();
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[backtest]
symbol = BTC-USD
fees = 0.001
initial_value = 10000

[strategy.trend]
name = Trend
entry = SMA(20) > SMA(100)
exit = SMA(20) < SMA(100)
active = yes

[strategy.Mean]
name = Mean Reversion
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "symbol"),
            Some("BTC-USD".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy.trend", "entry"),
            Some("SMA(20) > SMA(100)".to_string())
        );
    }

    #[test]
    fn sections_are_lowercase_and_sorted() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.sections(),
            vec!["backtest", "strategy.mean", "strategy.trend"]
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\nfees = 0.1\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[strategy.a]\nvolatility_lookback = 30\nbad = abc\n")
                .unwrap();
        assert_eq!(adapter.get_int("strategy.a", "volatility_lookback", 0), 30);
        assert_eq!(adapter.get_int("strategy.a", "missing", 42), 42);
        assert_eq!(adapter.get_int("strategy.a", "bad", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nfees = 0.0015\nslippage = nope\n").unwrap();
        assert_eq!(adapter.get_double("backtest", "fees", 0.0), 0.0015);
        assert_eq!(adapter.get_double("backtest", "missing", 99.9), 99.9);
        assert_eq!(adapter.get_double("backtest", "slippage", 99.9), 99.9);
    }

    #[test]
    fn get_bool_values() {
        let adapter = FileConfigAdapter::from_string(
            "[s]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("s", "a", false));
        assert!(adapter.get_bool("s", "b", false));
        assert!(adapter.get_bool("s", "c", false));
        assert!(!adapter.get_bool("s", "d", true));
        assert!(!adapter.get_bool("s", "e", true));
        assert!(!adapter.get_bool("s", "f", true));
        assert!(adapter.get_bool("s", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[backtest]\ndata_dir = /tmp/data\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "data_dir"),
            Some("/tmp/data".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        assert!(FileConfigAdapter::from_file("/nonexistent/path/config.ini").is_err());
    }
}

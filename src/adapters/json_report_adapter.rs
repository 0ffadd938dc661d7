//! JSON report adapter implementing ReportPort.
//!
//! Writes the whole [`BacktestReport`] as one JSON document. Report types
//! already carry NaN and infinities as `None`, so the output never holds
//! bare special float values.

use std::fs;
use std::path::Path;

use crate::domain::engine::BacktestReport;
use crate::domain::error::QuantError;
use crate::ports::report_port::ReportPort;

pub struct JsonReportAdapter {
    pretty: bool,
}

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn render(&self, report: &BacktestReport) -> Result<String, QuantError> {
        let json = if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };
        Ok(json)
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), QuantError> {
        let json = self.render(report)?;
        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::Record;
    use crate::domain::metrics::MetricsBundle;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_report() -> BacktestReport {
        let mut values = BTreeMap::new();
        values.insert("cumulative_equity".to_string(), Some(1.05));
        values.insert("portfolio_rolling_sharpe".to_string(), None);
        let record = Record {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            values,
        };
        let mut metrics = BTreeMap::new();
        metrics.insert("Portfolio".to_string(), MetricsBundle::default());
        BacktestReport {
            equity_curve: vec![record.clone()],
            drawdown: vec![record.clone()],
            rolling_sharpe: vec![record],
            metrics,
            signals: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    #[test]
    fn writes_report_creating_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.json");
        JsonReportAdapter::new()
            .write(&sample_report(), path.to_str().unwrap())
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(v["equityCurve"][0]["date"], "2024-05-01");
        assert_eq!(v["equityCurve"][0]["cumulative_equity"], 1.05);
        assert!(v["equityCurve"][0]["portfolio_rolling_sharpe"].is_null());
        assert!(v["metrics"]["Portfolio"]["Total Return"].is_null());
        assert_eq!(v["trades"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn compact_render_is_single_line() {
        let json = JsonReportAdapter::compact().render(&sample_report()).unwrap();
        assert!(!json.contains('\n'));
    }
}

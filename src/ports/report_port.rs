//! Report output port trait.

use crate::domain::engine::BacktestReport;
use crate::domain::error::QuantError;

pub trait ReportPort {
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), QuantError>;
}
